use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{Command, DesktopView, PlaybackState, Response, WallpaperReference};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "dwctl")]
#[command(about = "Desktop Wallpaper Daemon Control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set and persist the current wallpaper
    Set {
        /// Path, URL or storage key of the wallpaper
        reference: String,
    },

    /// Announce a wallpaper change without persisting it
    Notify {
        /// Path, URL or storage key of the wallpaper
        reference: String,
    },

    /// Import a local file into wallpaper storage and print its key
    Store {
        /// Path to the image or video file
        path: String,

        /// Also make the imported wallpaper current
        #[arg(short, long)]
        apply: bool,
    },

    /// Mark the desktop as visible (resumes video wallpapers)
    Show,

    /// Mark the desktop as hidden
    Hide,

    /// Signal that the desktop window gained focus
    Focus,

    /// Select a desktop icon
    Select {
        /// Icon id
        id: String,
    },

    /// Open a desktop icon
    Open {
        /// Icon id
        id: String,
    },

    /// Clear the icon selection
    Deselect,

    /// Print the rendered desktop
    Desktop {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Query daemon status
    Query,

    /// Ping the daemon to check if it's running
    Ping,

    /// Kill the running daemon
    Kill,
}

#[derive(Error, Debug)]
enum ClientError {
    #[error("daemon closed the connection without replying")]
    NoReply,
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl Commands {
    fn into_command(self) -> Result<Command> {
        let command = match self {
            Commands::Set { reference } => Command::SetWallpaper {
                reference: WallpaperReference::new(reference),
            },
            Commands::Notify { reference } => Command::NotifyWallpaper {
                reference: WallpaperReference::new(reference),
            },
            Commands::Store { path, .. } => {
                let absolute = std::fs::canonicalize(&path)
                    .with_context(|| format!("Cannot read wallpaper file: {}", path))?;
                Command::StoreWallpaper {
                    path: absolute.to_string_lossy().into_owned(),
                }
            }
            Commands::Show => Command::SetVisibility { visible: true },
            Commands::Hide => Command::SetVisibility { visible: false },
            Commands::Focus => Command::Focus,
            Commands::Select { id } => Command::SelectIcon { id },
            Commands::Open { id } => Command::OpenIcon { id },
            Commands::Deselect => Command::ClearSelection,
            Commands::Desktop { .. } => Command::GetDesktop,
            Commands::Query => Command::Query,
            Commands::Ping => Command::Ping,
            Commands::Kill => Command::Kill,
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let json = matches!(cli.command, Commands::Desktop { json: true });
    let apply = matches!(cli.command, Commands::Store { apply: true, .. });
    let command = cli.command.into_command()?;

    let response = match send_command(command).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: deskwall");
            std::process::exit(1);
        }
    };

    match response {
        Response::Stored(key) if apply => {
            println!("Stored as {}", key);
            let response = send_command(Command::SetWallpaper { reference: key }).await?;
            handle_response(response, json);
        }
        response => handle_response(response, json),
    }

    Ok(())
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    if reader.read_line(&mut response_line).await? == 0 {
        return Err(ClientError::NoReply.into());
    }

    let response: Response = serde_json::from_str(&response_line)
        .map_err(|e| ClientError::Unexpected(format!("{}: {}", e, response_line.trim())))?;
    Ok(response)
}

fn handle_response(response: Response, json: bool) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => {
            println!("Daemon Status:");
            println!("  Version: {}", status.version);
            println!("  Uptime: {}s", status.uptime_secs);
            if status.current_wallpaper.is_empty() {
                println!("  Current Wallpaper: (none)");
            } else {
                println!("  Current Wallpaper: {}", status.current_wallpaper);
            }
            if status.is_video_wallpaper {
                println!("  Playback: {}", describe_playback(status.playback));
            }
        }
        Response::Desktop(view) => {
            if json {
                match serde_json::to_string_pretty(&view) {
                    Ok(text) => println!("{}", text),
                    Err(e) => eprintln!("✗ Error: {}", e),
                }
            } else {
                print_desktop(&view);
            }
        }
        Response::Stored(key) => {
            println!("{}", key);
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_desktop(view: &DesktopView) {
    println!("Desktop:");
    match &view.video_source {
        Some(source) => {
            println!("  Video: {}", source);
            println!("  Playback: {}", describe_playback(view.playback));
        }
        None if view.display_source.is_empty() => println!("  Background: (none)"),
        None => println!("  Background: {}", abbreviate(view.display_source.as_str())),
    }

    let style = &view.style;
    for (name, value) in [
        ("size", &style.background_size),
        ("repeat", &style.background_repeat),
        ("position", &style.background_position),
        ("transition", &style.transition),
    ] {
        if let Some(value) = value {
            println!("    {}: {}", name, value);
        }
    }

    println!("  Icons:");
    for icon in &view.icons {
        let marker = if icon.selected { "*" } else { " " };
        println!("   {} {} ({})", marker, icon.name, icon.id);
    }
}

fn describe_playback(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::NotVideo => "n/a",
        PlaybackState::Paused => "paused",
        PlaybackState::Playing => "playing",
        PlaybackState::Ended => "ended",
    }
}

/// Data URLs are far too long to print in full
fn abbreviate(source: &str) -> String {
    const MAX: usize = 72;
    if source.chars().count() <= MAX {
        return source.to_string();
    }
    let head: String = source.chars().take(MAX).collect();
    format!("{}…", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        let cli = Cli::try_parse_from(std::iter::once("dwctl").chain(args.iter().copied())).unwrap();
        cli.command.into_command().unwrap()
    }

    #[test]
    fn test_visibility_commands() {
        assert!(matches!(
            parse(&["show"]),
            Command::SetVisibility { visible: true }
        ));
        assert!(matches!(
            parse(&["hide"]),
            Command::SetVisibility { visible: false }
        ));
    }

    #[test]
    fn test_set_keeps_reference_verbatim() {
        let Command::SetWallpaper { reference } = parse(&["set", "indexeddb://custom-1-a.png"])
        else {
            panic!("expected SetWallpaper");
        };
        assert_eq!(reference.as_str(), "indexeddb://custom-1-a.png");
    }

    #[test]
    fn test_store_requires_existing_file() {
        let cli = Cli::try_parse_from(["dwctl", "store", "/no/such/file.png"]).unwrap();
        assert!(cli.command.into_command().is_err());
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("/a.png"), "/a.png");
        let long = format!("data:image/png;base64,{}", "A".repeat(200));
        assert_eq!(abbreviate(&long).chars().count(), 73);
    }
}
