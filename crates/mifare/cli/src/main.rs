//! Command-line tool for MIFARE DESFire and SAM AV2 development
//!
//! This binary exposes the offline parts of the libraries: DESFire CRC32 key
//! checksums, session key derivation from recorded handshakes and the frame
//! sequence a SAM operation would send.

use clap::{Parser, Subcommand, ValueEnum};
use nexum_apdu_core::ApduCommand;
use nexum_apdu_desfire::{KeyType, crypto};
use nexum_apdu_sam::{CryptoAlgorithm, SamOperation, commands};
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the DESFire CRC32 of hex data
    Crc32 {
        /// Data (hex)
        data: String,
    },

    /// Derive session keys from a recorded handshake
    SessionKeys {
        /// Handshake variant
        #[arg(short, long, value_enum, default_value = "ev2")]
        mode: Mode,

        /// Long-term key (hex), unused by the legacy variants
        #[arg(short, long)]
        key: String,

        /// Host nonce RndA (hex)
        #[arg(long)]
        rnd_a: String,

        /// Card nonce RndB (hex)
        #[arg(long)]
        rnd_b: String,
    },

    /// Print the frames a SAM operation sends
    SamFrames {
        /// Operation
        #[arg(short, long, value_enum)]
        operation: Operation,

        /// Algorithm of the key entry
        #[arg(short, long, value_enum, default_value = "aes")]
        algorithm: Algorithm,

        /// Input data (hex)
        data: String,
    },

    /// Print the SAM_LoadInitVector frame for an IV
    LoadIv {
        /// Algorithm of the key entry
        #[arg(short, long, value_enum, default_value = "aes")]
        algorithm: Algorithm,

        /// IV (hex)
        iv: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    /// AuthenticateEV2First
    Ev2,
    /// AuthenticateISO with a 2K3DES key
    Legacy2k3des,
    /// AuthenticateISO with a 3K3DES key
    Legacy3k3des,
    /// AuthenticateAES
    LegacyAes,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Algorithm {
    /// DES, 2K3DES or 3K3DES
    Des,
    /// AES-128
    Aes,
}

impl From<Algorithm> for CryptoAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Des => Self::Des,
            Algorithm::Aes => Self::Aes,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Operation {
    /// SAM_EncipherData
    Encipher,
    /// SAM_EncipherOffline_Data
    EncipherOffline,
    /// SAM_DecipherOffline_Data
    DecipherOffline,
    /// SAM_GenerateMAC
    GenerateMac,
}

impl From<Operation> for SamOperation {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Encipher => Self::EncipherData,
            Operation::EncipherOffline => Self::EncipherOfflineData,
            Operation::DecipherOffline => Self::DecipherOfflineData,
            Operation::GenerateMac => Self::GenerateMac,
        }
    }
}

fn run(command: Commands) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let lines = match command {
        Commands::Crc32 { data } => {
            let data = hex::decode(data)?;
            vec![hex::encode_upper(crypto::crc32(&data))]
        }

        Commands::SessionKeys {
            mode,
            key,
            rnd_a,
            rnd_b,
        } => {
            let key = hex::decode(key)?;
            let rnd_a = hex::decode(rnd_a)?;
            let rnd_b = hex::decode(rnd_b)?;

            let keys = match mode {
                Mode::Ev2 => crypto::derive_ev2_session_keys(&key, &rnd_a, &rnd_b)?,
                Mode::Legacy2k3des => {
                    crypto::derive_legacy_session_key(KeyType::TwoKeyTdes, &rnd_a, &rnd_b)?
                }
                Mode::Legacy3k3des => {
                    crypto::derive_legacy_session_key(KeyType::ThreeKeyTdes, &rnd_a, &rnd_b)?
                }
                Mode::LegacyAes => {
                    crypto::derive_legacy_session_key(KeyType::Aes128, &rnd_a, &rnd_b)?
                }
            };

            vec![
                format!("ENC: {}", hex::encode_upper(keys.enc())),
                format!("MAC: {}", hex::encode_upper(keys.mac())),
            ]
        }

        Commands::SamFrames {
            operation,
            algorithm,
            data,
        } => {
            let data = hex::decode(data)?;
            let frames = commands::plan(operation.into(), algorithm.into(), &data)?;
            debug!(frames = frames.len(), "Planned SAM operation");
            frames
                .iter()
                .map(|frame| hex::encode_upper(frame.to_bytes()))
                .collect()
        }

        Commands::LoadIv { algorithm, iv } => {
            let iv = hex::decode(iv)?;
            let frame = commands::load_init_vector(algorithm.into(), &iv);
            vec![hex::encode_upper(frame.to_bytes())]
        }
    };

    Ok(lines)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the tracing logger with env_format and ansi
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();

    // Parse command line arguments
    let cli = Cli::parse();

    for line in run(cli.command)? {
        println!("{line}");
    }

    Ok(())
}
