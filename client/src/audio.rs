use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};
use log::{debug, error, info, warn};
use shared::{AudioArtifact, AudioConfig, ConsultError};
use std::io::Cursor;
use tokio::sync::mpsc;

/// Seam between the workflow controller and the microphone hardware.
pub trait CaptureDevice {
    /// Open the microphone and start accumulating samples. Rejected while a
    /// capture is already active; a second stream is never opened.
    fn begin(&mut self) -> Result<(), ConsultError>;

    /// Release the microphone and seal the accumulated samples into an
    /// artifact. A no-op returning `None` when nothing is being captured.
    fn end(&mut self) -> Result<Option<AudioArtifact>, ConsultError>;
}

pub struct AudioCapture {
    config: AudioConfig,
    active: Option<ActiveCapture>,
}

/// Owns the open stream; dropping this releases the microphone, so the
/// hardware can never outlive a capture or the adapter itself.
struct ActiveCapture {
    stream: cpal::Stream,
    rx: mpsc::UnboundedReceiver<Vec<f32>>,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            active: None,
        }
    }

    fn input_device(&self) -> Result<Device, ConsultError> {
        let host = cpal::default_host();

        if let Some(device_name) = &self.config.device {
            host.input_devices()
                .map_err(|e| ConsultError::PermissionDenied(e.to_string()))?
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| {
                    ConsultError::PermissionDenied(format!(
                        "audio device '{}' not found",
                        device_name
                    ))
                })
        } else {
            host.default_input_device().ok_or_else(|| {
                ConsultError::PermissionDenied("no input device available".to_string())
            })
        }
    }

    fn open_stream(&self, device: &Device) -> Result<ActiveCapture, ConsultError> {
        let supported = device
            .default_input_config()
            .map_err(|e| ConsultError::PermissionDenied(e.to_string()))?;

        let sample_rate = if self.config.sample_rate == 0 {
            supported.sample_rate().0
        } else {
            self.config.sample_rate
        };
        let channels = self.config.channels.max(1);

        let stream_config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.config.buffer_size as u32),
        };

        debug!("audio config: {:?}", stream_config);

        let (tx, rx) = mpsc::unbounded_channel();

        let stream = match supported.sample_format() {
            SampleFormat::I8 => self.build_stream::<i8>(device, &stream_config, tx)?,
            SampleFormat::I16 => self.build_stream::<i16>(device, &stream_config, tx)?,
            SampleFormat::I32 => self.build_stream::<i32>(device, &stream_config, tx)?,
            SampleFormat::U8 => self.build_stream::<u8>(device, &stream_config, tx)?,
            SampleFormat::U16 => self.build_stream::<u16>(device, &stream_config, tx)?,
            SampleFormat::F32 => self.build_stream::<f32>(device, &stream_config, tx)?,
            SampleFormat::F64 => self.build_stream::<f64>(device, &stream_config, tx)?,
            other => {
                // The recording is always delivered as 16-bit PCM WAV; a
                // source format we cannot convert is a capability mismatch,
                // never something to transcode around silently.
                return Err(ConsultError::FormatUnsupported(format!(
                    "cannot record {:?} samples into a WAV recording",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| ConsultError::PermissionDenied(e.to_string()))?;

        Ok(ActiveCapture {
            stream,
            rx,
            sample_rate,
            channels,
        })
    }

    fn build_stream<T>(
        &self,
        device: &Device,
        config: &StreamConfig,
        tx: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<cpal::Stream, ConsultError>
    where
        T: cpal::Sample + cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data
                        .iter()
                        .map(|&sample| cpal::Sample::to_sample(sample))
                        .collect();
                    // Fails only once the receiver is gone, i.e. capture is
                    // already shutting down.
                    let _ = tx.send(samples);
                },
                move |err| {
                    error!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| ConsultError::PermissionDenied(e.to_string()))
    }

    pub fn list_input_devices() -> Result<Vec<String>, ConsultError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| ConsultError::PermissionDenied(e.to_string()))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }
}

impl CaptureDevice for AudioCapture {
    fn begin(&mut self) -> Result<(), ConsultError> {
        if self.active.is_some() {
            warn!("capture already active, ignoring start");
            return Ok(());
        }

        let device = self.input_device()?;
        info!(
            "recording from device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        self.active = Some(self.open_stream(&device)?);
        Ok(())
    }

    fn end(&mut self) -> Result<Option<AudioArtifact>, ConsultError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let ActiveCapture {
            stream,
            mut rx,
            sample_rate,
            channels,
        } = active;

        // Release the microphone before anything that can fail; the artifact
        // must never hold the hardware open.
        drop(stream);

        let mut samples: Vec<f32> = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            samples.extend(chunk);
        }

        let frames = samples.len() / channels.max(1) as usize;
        let duration_ms = frames as u64 * 1000 / u64::from(sample_rate.max(1));
        let data = encode_wav(&samples, sample_rate, channels)?;
        info!(
            "recording stopped: {} samples, {} ms, {} bytes",
            samples.len(),
            duration_ms,
            data.len()
        );

        Ok(Some(AudioArtifact {
            data,
            sample_rate,
            channels,
            duration_ms,
        }))
    }
}

/// Seal f32 samples into a 16-bit PCM WAV container.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, ConsultError> {
    let spec = hound::WavSpec {
        channels: channels.max(1),
        sample_rate: sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| ConsultError::FormatUnsupported(e.to_string()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(value)
            .map_err(|e| ConsultError::FormatUnsupported(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| ConsultError::FormatUnsupported(e.to_string()))?;

    Ok(cursor.into_inner())
}

/// Read an existing WAV file into an artifact, for the one-shot
/// transcription path.
pub fn load_wav_file(path: &std::path::Path) -> Result<AudioArtifact, ConsultError> {
    let data = std::fs::read(path)
        .map_err(|e| ConsultError::ReadFailure(format!("{}: {}", path.display(), e)))?;
    let reader = hound::WavReader::new(Cursor::new(&data))
        .map_err(|e| ConsultError::ReadFailure(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let frames = u64::from(reader.duration());
    let duration_ms = frames * 1000 / u64::from(spec.sample_rate.max(1));

    Ok(AudioArtifact {
        data,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_ms,
    })
}
