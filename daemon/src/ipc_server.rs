use anyhow::Result;
use common::{Command, DaemonStatus, DeskError, Response, Visibility};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::DaemonState;
use crate::bus::DesktopEvent;

pub async fn start(state: Arc<DaemonState>) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.should_exit() {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(stream: UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(DeskError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

pub(crate) async fn handle_command(command: Command, state: &DaemonState) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Query => {
            let view = state.view.borrow().clone();
            Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: state.uptime_secs(),
                current_wallpaper: state.settings.current(),
                is_video_wallpaper: state.settings.is_video_wallpaper(),
                playback: view.playback,
            })
        }

        Command::GetDesktop => {
            let view = state.view.borrow().clone();
            Response::Desktop(view)
        }

        Command::SetWallpaper { reference } => {
            log::info!("Setting wallpaper: {}", reference);

            match state.settings.set_current(reference).await {
                Ok(_) => Response::Ok,
                Err(e) => Response::Error(DeskError::Io(format!(
                    "Failed to save wallpaper setting: {:#}",
                    e
                ))),
            }
        }

        Command::NotifyWallpaper { reference } => {
            log::info!("Publishing wallpaper change: {}", reference);
            state.bus.publish(DesktopEvent::WallpaperChanged(reference));
            Response::Ok
        }

        Command::StoreWallpaper { path } => {
            log::info!("Importing wallpaper: {}", path);

            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Response::Error(DeskError::NotFound(format!(
                        "Wallpaper file not found: {}",
                        path
                    )));
                }
                Err(e) => return Response::Error(e.into()),
            };

            match state.store.put(&path, &data).await {
                Ok(key) => Response::Stored(key),
                Err(e) => Response::Error(DeskError::Storage(e.to_string())),
            }
        }

        Command::SetVisibility { visible } => {
            let visibility = if visible {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            state
                .bus
                .publish(DesktopEvent::VisibilityChanged(visibility));
            Response::Ok
        }

        Command::Focus => {
            state.bus.publish(DesktopEvent::FocusGained);
            Response::Ok
        }

        Command::SelectIcon { id } => match check_icon(state, &id) {
            Some(err) => err,
            None => {
                state.bus.publish(DesktopEvent::IconSelected(id));
                Response::Ok
            }
        },

        Command::OpenIcon { id } => match check_icon(state, &id) {
            Some(err) => err,
            None => {
                state.bus.publish(DesktopEvent::IconOpened(id));
                Response::Ok
            }
        },

        Command::ClearSelection => {
            state.bus.publish(DesktopEvent::BackgroundClicked);
            Response::Ok
        }

        Command::Kill => {
            log::info!("Received kill command");
            state.request_exit();
            Response::Ok
        }
    }
}

/// Error response for ids that are not on the desktop
fn check_icon(state: &DaemonState, id: &str) -> Option<Response> {
    let known = state.view.borrow().icons.iter().any(|icon| icon.id == id);
    (!known).then(|| Response::Error(DeskError::NotFound(format!("No desktop icon: {}", id))))
}
