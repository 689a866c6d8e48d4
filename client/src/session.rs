use crate::api::ApiClient;
use crate::audio::AudioCapture;
use crate::controller::Controller;
use crate::ui;
use anyhow::Result;
use log::debug;
use shared::{Config, WorkflowState};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive consultation session: reads commands from stdin, drives the
/// workflow controller, and renders its state after every event.
pub async fn run(config: &Config) -> Result<()> {
    let api = ApiClient::new(&config.api)?;
    let capture = AudioCapture::new(&config.audio);
    let mut controller = Controller::new(capture, api);

    println!("Connected to {}.", controller.api().base_url());
    println!("{}", ui::format_help());
    println!();
    println!("{}", ui::format_status(controller.state(), controller.input()));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, Some(argument.trim())),
            None => (line, None),
        };
        debug!("command: {:?} {:?}", command, argument);

        match command {
            "" => continue,
            "record" => controller.start_capture(),
            "stop" => controller.stop_capture(),
            "discard" => controller.discard_audio(),
            "image" => match argument {
                Some(path) => controller.select_image(Path::new(path)).await,
                None => println!("usage: image <path>"),
            },
            "remove" => controller.remove_image(),
            "submit" => {
                println!("Submitting...");
                controller.submit().await;
                if let WorkflowState::Succeeded(result) = controller.state() {
                    println!("{}", ui::format_result(result));
                }
            }
            "play" => play_reply(&controller).await,
            "save" => match argument {
                Some(path) => save_reply(&controller, Path::new(path)).await,
                None => println!("usage: save <path>"),
            },
            "status" => {}
            "reset" => controller.reset(),
            "help" => println!("{}", ui::format_help()),
            "quit" | "exit" => break,
            other => println!("unknown command '{}'; type 'help'", other),
        }

        if let Some(notice) = controller.take_notice() {
            println!("{}", ui::format_notice(&notice));
        }
        println!("{}", ui::format_status(controller.state(), controller.input()));
    }

    Ok(())
}

async fn play_reply<C: crate::audio::CaptureDevice>(controller: &Controller<C>) {
    let Some(audio_url) = reply_url(controller) else {
        println!("no spoken reply to play");
        return;
    };
    match controller.api().fetch_audio(&audio_url).await {
        Ok(bytes) => {
            if let Err(e) = ui::play_audio(bytes).await {
                println!("playback failed: {}", e);
            }
        }
        Err(e) => println!("{}", ui::format_notice(&e.to_string())),
    }
}

async fn save_reply<C: crate::audio::CaptureDevice>(controller: &Controller<C>, path: &Path) {
    let Some(audio_url) = reply_url(controller) else {
        println!("no spoken reply to save");
        return;
    };
    match controller.api().fetch_audio(&audio_url).await {
        Ok(bytes) => match tokio::fs::write(path, &bytes).await {
            Ok(()) => println!("wrote {} bytes to {}", bytes.len(), path.display()),
            Err(e) => println!("could not write {}: {}", path.display(), e),
        },
        Err(e) => println!("{}", ui::format_notice(&e.to_string())),
    }
}

fn reply_url<C: crate::audio::CaptureDevice>(controller: &Controller<C>) -> Option<String> {
    match controller.state() {
        WorkflowState::Succeeded(result) => result.audio_url.clone(),
        _ => None,
    }
}
