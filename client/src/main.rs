mod api;
mod audio;
mod controller;
mod image;
mod session;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use shared::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "consult-client")]
#[command(about = "Client for the AI medical consultation service")]
struct Args {
    /// Base URL of the consultation service.
    #[arg(long, env = "CONSULT_API_BASE_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive consultation session.
    Consult,
    /// Transcribe a WAV recording without a full consultation.
    Transcribe { file: PathBuf },
    /// Analyze an image, optionally with transcribed symptoms.
    Analyze {
        image: PathBuf,
        #[arg(long)]
        transcription: Option<String>,
    },
    /// Synthesize speech for a piece of text.
    Speak {
        text: String,
        /// Write the audio here instead of playing it.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the service is reachable.
    Health,
    /// List available audio input devices.
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::load()?;
    config.apply_base_url_override(args.api_url);

    match args.command {
        Command::Consult => session::run(&config).await?,
        Command::Transcribe { file } => {
            let api = api::ApiClient::new(&config.api)?;
            let artifact = audio::load_wav_file(&file)?;
            let transcription = api.transcribe_audio(&artifact).await?;
            println!("{}", transcription);
        }
        Command::Analyze {
            image: path,
            transcription,
        } => {
            let api = api::ApiClient::new(&config.api)?;
            let artifact = image::select_file(&path).await?;
            let analysis = api.analyze_image(&artifact, transcription.as_deref()).await?;
            println!("{}", analysis);
            println!();
            println!("Disclaimer: {}", ui::DISCLAIMER);
        }
        Command::Speak { text, output } => {
            let api = api::ApiClient::new(&config.api)?;
            let audio = api.text_to_speech(&text).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &audio).await?;
                    info!("wrote {} bytes to {}", audio.len(), path.display());
                    println!("{}", path.display());
                }
                None => ui::play_audio(audio).await?,
            }
        }
        Command::Health => {
            let api = api::ApiClient::new(&config.api)?;
            println!("{}", api.health_check().await?);
        }
        Command::Devices => {
            for name in audio::AudioCapture::list_input_devices()? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
