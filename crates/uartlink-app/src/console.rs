use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uartlink_core::{
    list_ports, Direction, Frame, LinkEvent, LinkManager, TextEncoding, Transcript,
};

const PREVIEW_BYTES: usize = 16;

pub const HELP: &str = "\
Type a line to send it as text. Commands:
  /image PATH          send a file as an image frame
  /ports SEND RECEIVE  reconnect with new addresses (same address shares one port)
  /list                list serial ports
  /history             show sent and received frames
  /clear               clear the history
  /help                show this message
  /quit                exit
Start a line with // to send text beginning with '/'.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Image(PathBuf),
    Ports { send: String, receive: String },
    List,
    History,
    Clear,
    Help,
    Quit,
}

/// Parse one input line. Blank lines are `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if let Some(text) = line.strip_prefix("//") {
        return Ok(Some(Command::Text(format!("/{text}"))));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Text(line.to_string())));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "image" if !args.is_empty() => Command::Image(PathBuf::from(args)),
        "image" => return Err("usage: /image PATH".to_string()),
        "ports" => {
            let mut parts = args.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(send), Some(receive), None) => Command::Ports {
                    send: send.to_string(),
                    receive: receive.to_string(),
                },
                _ => return Err("usage: /ports SEND RECEIVE".to_string()),
            }
        }
        "list" => Command::List,
        "history" => Command::History,
        "clear" => Command::Clear,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}

/// Renders link events and keeps the frame history.
pub struct Console {
    encoding: TextEncoding,
    image_path: PathBuf,
    transcript: Transcript,
}

impl Console {
    pub fn new(encoding: TextEncoding, image_path: PathBuf, history_size: usize) -> Self {
        Self {
            encoding,
            image_path,
            transcript: Transcript::new(history_size),
        }
    }

    pub fn show_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(Frame::Text(bytes)) => {
                if !bytes.is_empty() {
                    println!("{}", self.encoding.decode(&bytes));
                }
                self.transcript.push(Direction::Rx, Frame::Text(bytes));
            }
            LinkEvent::Frame(Frame::Image(payload)) => {
                match save_image(&self.image_path, &payload) {
                    Ok(()) => println!(
                        "[Image received: {} bytes, saved to {}] {}",
                        payload.len(),
                        self.image_path.display(),
                        preview(&payload)
                    ),
                    Err(e) => log::error!("{e:#}"),
                }
                self.transcript.push(Direction::Rx, Frame::Image(payload));
            }
            LinkEvent::DecodeError(e) => println!("status: receive error: {e}"),
            LinkEvent::Opened { address, role } => println!("status: {address} open ({role:?})"),
            LinkEvent::OpenFailed { address, error } => {
                println!("status: could not open {address}: {error}")
            }
            LinkEvent::Closed { address } => log::debug!("{address} closed"),
        }
    }

    /// Run everything except `/ports`, which the caller owns.
    pub fn execute(&mut self, command: Command, link: &LinkManager) -> Result<()> {
        match command {
            Command::Text(text) => {
                link.send_text(&text)?;
                println!("status: text data sent.");
                self.transcript.push(Direction::Tx, Frame::text(text));
            }
            Command::Image(path) => {
                let payload =
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                println!("status: sending image {}...", path.display());
                link.send_image(&payload)?;
                println!("status: image data sent ({} bytes).", payload.len());
                self.transcript.push(Direction::Tx, Frame::Image(payload));
            }
            Command::List => {
                let ports = list_ports();
                if ports.is_empty() {
                    println!("no serial ports found");
                }
                for port in ports {
                    println!("{}  [{}]", port.label(), port.port_type);
                }
            }
            Command::History => print!("{}", self.transcript.to_text(true, self.encoding)),
            Command::Clear => self.transcript.clear(),
            Command::Help => println!("{HELP}"),
            Command::Ports { .. } | Command::Quit => {}
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

fn save_image(path: &Path, payload: &[u8]) -> Result<()> {
    fs::write(path, payload).with_context(|| format!("writing image to {}", path.display()))
}

fn preview(payload: &[u8]) -> String {
    let head = hex::encode(&payload[..payload.len().min(PREVIEW_BYTES)]);
    if payload.len() > PREVIEW_BYTES {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use uartlink_core::{LinkConfig, LoopbackConnector};

    #[test]
    fn test_parse_text() {
        assert_eq!(parse("  hello world \n"), Ok(Some(Command::Text("hello world".into()))));
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("//etc"), Ok(Some(Command::Text("/etc".into()))));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse("/image /tmp/cat picture.png"),
            Ok(Some(Command::Image(PathBuf::from("/tmp/cat picture.png"))))
        );
        assert_eq!(
            parse("/ports /dev/ttyACM0 /dev/ttyACM0"),
            Ok(Some(Command::Ports {
                send: "/dev/ttyACM0".into(),
                receive: "/dev/ttyACM0".into(),
            }))
        );
        assert_eq!(parse("/exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse("/history"), Ok(Some(Command::History)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("/image").is_err());
        assert!(parse("/ports only-one").is_err());
        assert!(parse("/ports a b c").is_err());
        assert!(parse("/bogus").is_err());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview(&[0xde, 0xad]), "dead");
        assert_eq!(preview(&[0u8; 20]), format!("{}...", "00".repeat(16)));
    }

    #[test]
    fn test_round_trip_through_loopback() {
        let dir = std::env::temp_dir().join(format!("uartlink-console-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let image_path = dir.join("received_image.png");

        let connector = LoopbackConnector::new();
        let mut link = LinkManager::new(LinkConfig::default(), Arc::new(connector));
        link.reconfigure("/dev/a", "/dev/a");

        let mut console = Console::new(TextEncoding::Utf8, image_path.clone(), 10);
        console.execute(Command::Text("ping".into()), &link).unwrap();
        link.send_image(b"\x89PNG").unwrap();

        let mut received = 0;
        while received < 2 {
            let event = link.events().recv_timeout(Duration::from_secs(2)).unwrap();
            if matches!(event, LinkEvent::Frame(_)) {
                received += 1;
            }
            console.show_event(event);
        }

        assert_eq!(fs::read(&image_path).unwrap(), b"\x89PNG");
        assert_eq!(console.transcript().len(), 3);
        let _ = fs::remove_dir_all(dir);
    }
}
