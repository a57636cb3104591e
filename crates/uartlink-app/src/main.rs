mod console;
mod logging;
mod settings;

use anyhow::Result;
use clap::Parser;
use console::{Command, Console};
use crossbeam_channel::{select, unbounded, Receiver};
use logging::LogLevel;
use settings::Settings;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use uartlink_core::{
    list_ports, Connector, LinkEvent, LinkManager, LoopbackConnector, SerialPortConnector,
};

#[derive(Parser, Debug)]
#[command(name = "uartlink", version, about = "Send and receive text and images over a serial link")]
struct Args {
    /// Send port address
    #[arg(long, env = "UARTLINK_SEND")]
    send: Option<String>,

    /// Receive port address; the same address as --send shares one port
    #[arg(long, env = "UARTLINK_RECEIVE")]
    receive: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Text encoding for received text (auto, UTF-8, UTF-16, ASCII, GBK)
    #[arg(long)]
    encoding: Option<String>,

    /// Where received images are written
    #[arg(long)]
    image_path: Option<PathBuf>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist the effective settings
    #[arg(long)]
    save: bool,

    /// Use in-memory virtual ports instead of real devices
    #[arg(long)]
    loopback: bool,

    /// List serial ports and exit
    #[arg(long)]
    list: bool,

    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(send) = &self.send {
            settings.send_port = send.clone();
        }
        if let Some(receive) = &self.receive {
            settings.receive_port = receive.clone();
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(encoding) = &self.encoding {
            settings.encoding = encoding.clone();
        }
        if let Some(image_path) = &self.image_path {
            settings.image_path = image_path.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_level);

    if args.list {
        for port in list_ports() {
            println!("{}  [{}]", port.label(), port.port_type);
        }
        return Ok(());
    }

    let config_path = args.config.clone().or_else(Settings::default_path);
    let mut settings = match &config_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    args.apply(&mut settings);
    let encoding = settings.text_encoding()?;
    if args.save {
        save_settings(&settings, config_path.as_deref());
    }

    let loopback = args.loopback.then(LoopbackConnector::new);
    let connector: Arc<dyn Connector> = match &loopback {
        Some(loopback) => {
            loopback.connect(&settings.send_port, &settings.receive_port);
            Arc::new(loopback.clone())
        }
        None => Arc::new(SerialPortConnector::default()),
    };

    let mut link = LinkManager::new(settings.link_config(), connector);
    link.reconfigure(&settings.send_port, &settings.receive_port);

    let mut term = Console::new(encoding, settings.image_path.clone(), settings.history_size);
    let events = link.events().clone();
    let lines = spawn_stdin_reader();
    println!("{}", console::HELP);

    loop {
        let input = select! {
            recv(events) -> event => event.map(Input::Event).unwrap_or(Input::Closed),
            recv(lines) -> line => line.map(Input::Line).unwrap_or(Input::Closed),
        };
        let line = match input {
            Input::Event(event) => {
                term.show_event(event);
                continue;
            }
            Input::Line(line) => line,
            Input::Closed => break,
        };

        let command = match console::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match command {
            Command::Quit => break,
            Command::Ports { send, receive } => {
                if let Some(loopback) = &loopback {
                    loopback.connect(&send, &receive);
                }
                link.reconfigure(&send, &receive);
                println!("status: ports updated.");
                settings.send_port = send;
                settings.receive_port = receive;
                save_settings(&settings, config_path.as_deref());
            }
            command => {
                if let Err(e) = term.execute(command, &link) {
                    println!("error: {e:#}");
                }
            }
        }
    }

    link.shutdown();
    for event in events.try_iter() {
        term.show_event(event);
    }
    Ok(())
}

enum Input {
    Event(LinkEvent),
    Line(String),
    Closed,
}

fn save_settings(settings: &Settings, path: Option<&std::path::Path>) {
    let Some(path) = path else {
        log::warn!("no config directory; settings not saved");
        return;
    };
    if let Err(e) = settings.save(path) {
        log::error!("{e:#}");
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}
