use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Input;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nfctag::card::SelectError;
use nfctag::key::KeyError;
use nfctag::mifare::CardSize;
use nfctag::pcsc::{Context, PcscCard};
use nfctag::session::{self, DumpRequest, WriteRequest, DEFAULT_BLOCK};
use nfctag::tech::Flow;
use nfctag::{Card, Key, Report, Session};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Error occurred on communicating with NFC device: {0}")]
    Nfc(#[from] nfctag::pcsc::Error),

    #[error("{0}")]
    Key(#[from] KeyError),

    #[error("Application identifier must be hexadecimal: {0}")]
    Aid(#[from] hex::FromHexError),

    #[error("{0}")]
    Select(#[from] SelectError),

    #[error("Could not read your input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not serialise the report: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Prints the report as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the technologies of the tag on the reader.
    Detect {
        /// Checks whether the tag can be written instead of read.
        #[arg(long)]
        write: bool,
    },

    /// Writes up to 16 bytes of text into one block.
    Write {
        #[arg(short, long, default_value_t = DEFAULT_BLOCK)]
        block: u8,

        /// Key A of the sector in hex. Defaults to FFFFFFFFFFFF.
        #[arg(short, long, default_value = "")]
        key: String,

        /// Text to write. Prompted for when omitted.
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Reads every sector the tag allows.
    Read {
        /// Key A of the sectors in hex. Defaults to FFFFFFFFFFFF.
        #[arg(short, long, default_value = "")]
        key: String,
    },

    /// Dumps every sector regardless of the detected technologies.
    Dump {
        #[arg(short, long, default_value = "")]
        key: String,

        #[arg(short, long, value_enum, default_value_t = Size::Classic1K)]
        size: Size,
    },

    /// Selects an application by its identifier.
    Select {
        /// Application identifier in hex.
        aid: String,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum Size {
    Mini,
    #[value(name = "1k")]
    Classic1K,
    #[value(name = "4k")]
    Classic4K,
}

impl From<Size> for CardSize {
    fn from(size: Size) -> Self {
        match size {
            Size::Mini => CardSize::Mini,
            Size::Classic1K => CardSize::Classic1K,
            Size::Classic4K => CardSize::Classic4K,
        }
    }
}

fn open() -> Result<PcscCard> {
    let ctx = Context::try_new()?;
    let device = ctx.open()?;

    Ok(device.connect()?)
}

fn run(command: Commands) -> Result<Report> {
    let pcsc_card = open()?;
    let tag = pcsc_card.tag();
    debug!("ATR: {}", hex::encode(pcsc_card.atr()));

    let mut session = Session::new(Card::new(pcsc_card));

    Ok(match command {
        Commands::Detect { write } => {
            let flow = match write {
                true => Flow::Write,
                _ => Flow::Read,
            };

            session::detect(flow, &tag).0
        }
        Commands::Write { block, key, data } => {
            let data = match data {
                Some(data) => data,
                None => Input::<String>::new()
                    .with_prompt("Data")
                    .allow_empty(true)
                    .interact_text()?,
            };

            info!("Writing block {}", block);
            let request = WriteRequest::parse(&key, &data)?.with_block(block);

            session.write_tag((), &tag, &request)
        }
        Commands::Read { key } => session.read_tag((), &tag, &Key::from_hex(&key)?),
        Commands::Dump { key, size } => {
            let request = DumpRequest {
                key: Key::from_hex(&key)?,
                size: size.into(),
            };

            session.dump((), &request)
        }
        Commands::Select { aid } => {
            let aid = hex::decode(aid.trim())?;
            let result = session.card_mut().select_application((), &aid);
            if let Err(e) = session.card_mut().close(()) {
                debug!("Error closing tag: {}", e);
            }

            let mut report = Report::new();
            report.push(format!("Selected: {}", hex::encode(result?)));
            report
        }
    })
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let report = run(cli.command)?;

    match cli.json {
        true => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", report),
    }

    Ok(match report.is_ok() {
        true => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
