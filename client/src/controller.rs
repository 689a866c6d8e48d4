use crate::api::ApiClient;
use crate::audio::CaptureDevice;
use crate::image;
use log::{info, warn};
use shared::{ConsultError, ConsultationInput, WorkflowState};
use std::path::Path;

/// Owns every piece of mutable consultation state and the transitions
/// between workflow states.
///
/// Events are `&mut self` methods and run to completion before the next is
/// handled; the only suspension points are the image read and the network
/// round-trip. Adapter failures attach a transient notice and leave the
/// machine where it was; only a submission outcome moves it into
/// `Succeeded`/`Failed`, and those states accept nothing but `reset`.
pub struct Controller<C: CaptureDevice> {
    state: WorkflowState,
    input: ConsultationInput,
    notice: Option<String>,
    capture: C,
    api: ApiClient,
}

impl<C: CaptureDevice> Controller<C> {
    pub fn new(capture: C, api: ApiClient) -> Self {
        Self {
            state: WorkflowState::Idle,
            input: ConsultationInput::default(),
            notice: None,
            capture,
            api,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn input(&self) -> &ConsultationInput {
        &self.input
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Transient message from the last rejected or failed event, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Idle/Ready -> Capturing.
    pub fn start_capture(&mut self) {
        match self.state {
            WorkflowState::Idle | WorkflowState::Ready => {}
            WorkflowState::Capturing => {
                self.notice = Some("already recording".to_string());
                return;
            }
            _ => {
                self.notice = Some("finish the current consultation first".to_string());
                return;
            }
        }

        match self.capture.begin() {
            Ok(()) => {
                info!("capture started");
                self.state = WorkflowState::Capturing;
            }
            Err(e) => {
                warn!("capture failed to start: {}", e);
                self.notice = Some(e.to_string());
            }
        }
    }

    /// Capturing -> Ready, storing the finished audio artifact. Stopping
    /// when not recording is a no-op.
    pub fn stop_capture(&mut self) {
        if !matches!(self.state, WorkflowState::Capturing) {
            return;
        }

        match self.capture.end() {
            Ok(artifact) => {
                self.input.audio = artifact;
                self.state = WorkflowState::Ready;
            }
            Err(e) => {
                warn!("capture failed to finish: {}", e);
                self.notice = Some(e.to_string());
                self.state = WorkflowState::Ready;
            }
        }
    }

    /// Idle/Ready -> Ready with an image artifact and preview attached.
    /// A failed selection stores nothing and leaves the state alone.
    pub async fn select_image(&mut self, path: &Path) {
        if !matches!(self.state, WorkflowState::Idle | WorkflowState::Ready) {
            self.notice = Some("finish the current consultation first".to_string());
            return;
        }

        match image::select_file(path).await {
            Ok(artifact) => {
                info!("image '{}' attached", artifact.file_name);
                self.input.image = Some(artifact);
                self.state = WorkflowState::Ready;
            }
            Err(e) => {
                warn!("image selection failed: {}", e);
                self.notice = Some(e.to_string());
            }
        }
    }

    pub fn remove_image(&mut self) {
        if matches!(self.state, WorkflowState::Ready) {
            self.input.image = None;
        }
    }

    pub fn discard_audio(&mut self) {
        if matches!(self.state, WorkflowState::Ready) {
            self.input.audio = None;
        }
    }

    /// Ready -> Submitting -> Succeeded/Failed.
    ///
    /// With no artifacts staged the submission is rejected locally; the API
    /// client is never called for an empty consultation.
    pub async fn submit(&mut self) {
        if !matches!(self.state, WorkflowState::Ready) {
            self.notice = Some("nothing staged for submission".to_string());
            return;
        }
        if !self.input.has_artifacts() {
            self.notice = Some(ConsultError::Validation.to_string());
            return;
        }

        self.state = WorkflowState::Submitting;
        let outcome = self
            .api
            .medical_consultation(self.input.audio.as_ref(), self.input.image.as_ref())
            .await;

        self.state = match outcome {
            Ok(result) => WorkflowState::Succeeded(result),
            Err(e) => {
                warn!("consultation failed: {}", e);
                WorkflowState::Failed(e.to_string())
            }
        };
    }

    /// Succeeded/Failed/Ready -> Idle, dropping artifacts, result, and any
    /// pending notice. Rejected while the microphone or a request is open.
    pub fn reset(&mut self) {
        if matches!(
            self.state,
            WorkflowState::Capturing | WorkflowState::Submitting
        ) {
            self.notice = Some("cannot reset while work is in progress".to_string());
            return;
        }

        self.input.clear();
        self.notice = None;
        self.state = WorkflowState::Idle;
        info!("consultation reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ApiConfig, AudioArtifact};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Capture double that hands out a canned recording and counts how many
    /// streams were ever opened.
    struct FakeCapture {
        active: bool,
        begins: usize,
        deny: bool,
    }

    impl FakeCapture {
        fn new() -> Self {
            Self {
                active: false,
                begins: 0,
                deny: false,
            }
        }

        fn denied() -> Self {
            Self {
                active: false,
                begins: 0,
                deny: true,
            }
        }
    }

    impl CaptureDevice for FakeCapture {
        fn begin(&mut self) -> Result<(), ConsultError> {
            if self.deny {
                return Err(ConsultError::PermissionDenied(
                    "microphone access denied".to_string(),
                ));
            }
            if self.active {
                return Ok(());
            }
            self.active = true;
            self.begins += 1;
            Ok(())
        }

        fn end(&mut self) -> Result<Option<AudioArtifact>, ConsultError> {
            if !self.active {
                return Ok(None);
            }
            self.active = false;
            Ok(Some(AudioArtifact {
                data: crate::audio::encode_wav(&[0.1, 0.2, -0.1], 16000, 1).unwrap(),
                sample_rate: 16000,
                channels: 1,
                duration_ms: 200,
            }))
        }
    }

    struct BodyContains(&'static [u8]);

    impl wiremock::Match for BodyContains {
        fn matches(&self, request: &Request) -> bool {
            request
                .body
                .windows(self.0.len())
                .any(|window| window == self.0)
        }
    }

    fn body_has(request: &Request, needle: &[u8]) -> bool {
        request.body.windows(needle.len()).any(|w| w == needle)
    }

    fn controller_for(server: &MockServer) -> Controller<FakeCapture> {
        controller_with(server, FakeCapture::new(), 5)
    }

    fn controller_with(
        server: &MockServer,
        capture: FakeCapture,
        timeout_seconds: u64,
    ) -> Controller<FakeCapture> {
        let api = ApiClient::new(&ApiConfig {
            base_url: server.uri(),
            timeout_seconds,
        })
        .unwrap();
        Controller::new(capture, api)
    }

    fn png_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [7u8, 8, 9]).unwrap();
        path
    }

    fn success_response() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transcription": "y",
            "analysis": "x"
        }))
    }

    #[tokio::test]
    async fn starts_idle_with_nothing_staged() {
        let server = MockServer::start().await;
        let mut controller = controller_for(&server);

        assert_eq!(*controller.state(), WorkflowState::Idle);
        assert_eq!(*controller.input(), ConsultationInput::default());
        assert_eq!(controller.take_notice(), None);
    }

    #[tokio::test]
    async fn record_then_stop_stores_an_artifact() {
        let server = MockServer::start().await;
        let mut controller = controller_for(&server);

        controller.start_capture();
        assert_eq!(*controller.state(), WorkflowState::Capturing);

        controller.stop_capture();
        assert_eq!(*controller.state(), WorkflowState::Ready);
        assert!(controller.input().audio.is_some());
    }

    #[tokio::test]
    async fn starting_while_capturing_never_opens_a_second_stream() {
        let server = MockServer::start().await;
        let mut controller = controller_for(&server);

        controller.start_capture();
        controller.start_capture();

        assert_eq!(controller.take_notice().as_deref(), Some("already recording"));
        assert_eq!(*controller.state(), WorkflowState::Capturing);
        assert_eq!(controller.capture.begins, 1);
    }

    #[tokio::test]
    async fn stopping_without_a_capture_is_a_noop() {
        let server = MockServer::start().await;
        let mut controller = controller_for(&server);

        controller.stop_capture();
        assert_eq!(*controller.state(), WorkflowState::Idle);
        assert_eq!(controller.take_notice(), None);
    }

    #[tokio::test]
    async fn denied_microphone_stays_put_with_a_notice() {
        let server = MockServer::start().await;
        let mut controller = controller_with(&server, FakeCapture::denied(), 5);

        controller.start_capture();
        assert_eq!(*controller.state(), WorkflowState::Idle);
        let notice = controller.take_notice().unwrap();
        assert!(notice.contains("microphone"));
    }

    #[tokio::test]
    async fn empty_submission_never_reaches_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(success_response())
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_for(&server);

        // Reach Ready with zero artifacts: attach an image, then remove it.
        controller.select_image(&png_fixture(&dir)).await;
        controller.remove_image();
        assert_eq!(*controller.state(), WorkflowState::Ready);

        controller.submit().await;
        assert_eq!(*controller.state(), WorkflowState::Ready);
        let notice = controller.take_notice().unwrap();
        assert!(notice.contains("audio recording or an image"));
    }

    #[tokio::test]
    async fn audio_only_submission_succeeds_with_mapped_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .and(BodyContains(b"name=\"audio\""))
            .respond_with(success_response())
            .expect(1)
            .mount(&server)
            .await;

        let mut controller = controller_for(&server);
        controller.start_capture();
        controller.stop_capture();
        controller.submit().await;

        match controller.state() {
            WorkflowState::Succeeded(result) => {
                assert_eq!(result.transcription.as_deref(), Some("y"));
                assert_eq!(result.analysis, "x");
                assert_eq!(result.audio_url, None);
            }
            other => panic!("unexpected state: {:?}", other),
        }

        let requests = server.received_requests().await.unwrap();
        assert!(!body_has(&requests[0], b"name=\"image\""));
    }

    #[tokio::test]
    async fn server_error_moves_to_failed_and_keeps_artifacts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Traceback: boom"))
            .mount(&server)
            .await;

        let mut controller = controller_for(&server);
        controller.start_capture();
        controller.stop_capture();
        controller.submit().await;

        match controller.state() {
            WorkflowState::Failed(message) => {
                assert!(message.contains("500"));
                assert!(!message.contains("Traceback"));
            }
            other => panic!("unexpected state: {:?}", other),
        }
        // Artifacts stay logically present until an explicit reset.
        assert!(controller.input().audio.is_some());
    }

    #[tokio::test]
    async fn timeout_moves_to_failed_with_a_network_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(success_response().set_delay(std::time::Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut controller = controller_with(&server, FakeCapture::new(), 1);
        controller.start_capture();
        controller.stop_capture();
        controller.submit().await;

        match controller.state() {
            WorkflowState::Failed(message) => assert!(message.contains("timed out")),
            other => panic!("unexpected state: {:?}", other),
        }
        assert!(controller.input().audio.is_some());
    }

    #[tokio::test]
    async fn non_image_selection_stores_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();

        let mut controller = controller_for(&server);
        controller.start_capture();
        controller.stop_capture();

        controller.select_image(&path).await;
        assert_eq!(*controller.state(), WorkflowState::Ready);
        assert!(controller.input().image.is_none());
        assert!(controller.take_notice().unwrap().contains("not an image"));
    }

    #[tokio::test]
    async fn reset_restores_the_initial_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(success_response())
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_for(&server);
        controller.start_capture();
        controller.stop_capture();
        controller.select_image(&png_fixture(&dir)).await;
        controller.submit().await;
        assert!(matches!(controller.state(), WorkflowState::Succeeded(_)));

        controller.reset();
        assert_eq!(*controller.state(), WorkflowState::Idle);
        assert_eq!(*controller.input(), ConsultationInput::default());
        assert_eq!(controller.take_notice(), None);

        // Resetting again changes nothing.
        controller.reset();
        assert_eq!(*controller.state(), WorkflowState::Idle);
    }

    #[tokio::test]
    async fn reset_clears_artifacts_between_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(success_response())
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_for(&server);

        // First session: image only.
        controller.select_image(&png_fixture(&dir)).await;
        controller.submit().await;
        assert!(matches!(controller.state(), WorkflowState::Succeeded(_)));
        controller.reset();

        // Second session: audio only. The first session's image must not
        // leak into this request.
        controller.start_capture();
        controller.stop_capture();
        controller.submit().await;
        assert!(matches!(controller.state(), WorkflowState::Succeeded(_)));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(body_has(&requests[0], b"name=\"image\""));
        assert!(!body_has(&requests[0], b"name=\"audio\""));
        assert!(body_has(&requests[1], b"name=\"audio\""));
        assert!(!body_has(&requests[1], b"name=\"image\""));
    }

    #[tokio::test]
    async fn succeeded_requires_reset_before_anything_else() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medical-consultation"))
            .respond_with(success_response())
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller_for(&server);
        controller.select_image(&png_fixture(&dir)).await;
        controller.submit().await;
        assert!(matches!(controller.state(), WorkflowState::Succeeded(_)));

        // No direct resubmission and no new capture from a finished state.
        controller.submit().await;
        assert!(controller.take_notice().is_some());
        controller.start_capture();
        assert!(controller.take_notice().is_some());
        assert!(matches!(controller.state(), WorkflowState::Succeeded(_)));
    }

    #[tokio::test]
    async fn discarding_audio_keeps_the_machine_ready() {
        let server = MockServer::start().await;
        let mut controller = controller_for(&server);

        controller.start_capture();
        controller.stop_capture();
        assert!(controller.input().audio.is_some());

        controller.discard_audio();
        assert!(controller.input().audio.is_none());
        assert_eq!(*controller.state(), WorkflowState::Ready);
    }
}
