#![forbid(unsafe_code)]

//! Sigtuna CLI — XAdES operations (sign, verify, counter-sign).

use clap::{Parser, Subcommand};
use sigtuna_c14n::C14nMode;
use sigtuna_core::Error;
use sigtuna_keys::{loader, Key};
use sigtuna_xades::{
    ResourceInput, ResourceKind, SignOptions, SignatureMode, VerifyOptions, XadesSigner,
    XadesVerifier,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — Pure Rust XAdES signatures over XML-DSig",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign an XML document (enveloped by default)
    Sign {
        /// Input XML file
        file: PathBuf,

        /// RSA private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Signing certificate (PEM or DER)
        #[arg(short = 'c', long)]
        cert: PathBuf,

        /// Issuer certificate to embed alongside the signer cert
        #[arg(long)]
        issuer_cert: Option<PathBuf>,

        /// Produce a detached signature referencing the file by name
        #[arg(long)]
        detached: bool,

        /// Embed the payload inside the signature (enveloping mode)
        #[arg(long, conflicts_with = "detached")]
        enveloping: bool,

        /// Use exclusive canonicalization
        #[arg(long)]
        exc_c14n: bool,

        /// Output directory (default: alongside the input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file name (".xml" appended when no extension is given)
        #[arg(short = 'n', long)]
        output_name: Option<String>,

        /// Claimed signer role
        #[arg(long)]
        role: Vec<String>,
    },

    /// Verify a signed XML document
    Verify {
        /// Signed XML file
        file: PathBuf,

        /// Trusted certificate, for signatures whose KeyInfo carries none
        #[arg(long)]
        trusted: Option<PathBuf>,

        /// Base directory for resolving detached references
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Map an external reference URI to a local file (URI=FILE)
        #[arg(long = "url-map")]
        url_map: Vec<String>,
    },

    /// Counter-sign an existing signature
    CounterSign {
        /// Signed XML file
        file: PathBuf,

        /// RSA private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Counter-signer certificate (PEM or DER)
        #[arg(short = 'c', long)]
        cert: PathBuf,

        /// Output directory (default: alongside the input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file name
        #[arg(short = 'n', long)]
        output_name: Option<String>,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sign {
            file,
            key,
            cert,
            issuer_cert,
            detached,
            enveloping,
            exc_c14n,
            output_dir,
            output_name,
            role,
        } => {
            let key = load_key(&key, &cert, issuer_cert.as_deref())?;
            let mode = if detached {
                SignatureMode::Detached
            } else if enveloping {
                SignatureMode::Enveloping
            } else {
                SignatureMode::Enveloped
            };
            let input = ResourceInput::new(
                ResourceKind::File(file),
                detached,
                output_dir,
                output_name,
            )?;
            let opts = SignOptions {
                mode,
                c14n: if exc_c14n {
                    C14nMode::Exclusive
                } else {
                    C14nMode::Inclusive
                },
                signer_role: (!role.is_empty()).then(|| sigtuna_xades::SignerRole {
                    claimed_roles: role,
                }),
                ..SignOptions::default()
            };
            let signed = XadesSigner::new().sign(&input, key, &opts)?;
            if let Some(path) = &signed.path {
                println!("wrote {} ({})", path.display(), signed.signature_id);
            }
            Ok(())
        }
        Commands::Verify {
            file,
            trusted,
            base_dir,
            url_map,
        } => {
            let trust_cert_der = match trusted {
                Some(path) => Some(loader::load_certificate_auto(&std::fs::read(path)?)?),
                None => None,
            };
            let mut url_maps = Vec::new();
            for entry in &url_map {
                let (url, path) = entry.split_once('=').ok_or_else(|| {
                    Error::InvalidInput(format!("url-map must be URI=FILE: {entry}"))
                })?;
                url_maps.push((url.to_owned(), path.to_owned()));
            }
            let opts = VerifyOptions {
                trust_cert_der,
                tsa: None,
                detached_base_dir: base_dir.map(|p| p.to_string_lossy().into_owned()),
                url_maps,
            };
            let report = XadesVerifier::new().verify_file(&file, &opts)?;
            println!(
                "OK: signature valid ({} time-stamp(s), {} counter-signature(s))",
                report.timestamps, report.counter_signatures
            );
            Ok(())
        }
        Commands::CounterSign {
            file,
            key,
            cert,
            output_dir,
            output_name,
        } => {
            let key = load_key(&key, &cert, None)?;
            let input = ResourceInput::new(
                ResourceKind::File(file),
                false,
                output_dir,
                output_name,
            )?;
            let opts = SignOptions::default();
            let signed = XadesSigner::new().counter_sign(&input, key, &opts)?;
            if let Some(path) = &signed.path {
                println!("wrote {} ({})", path.display(), signed.signature_id);
            }
            Ok(())
        }
    }
}

fn load_key(
    key_path: &std::path::Path,
    cert_path: &std::path::Path,
    issuer_path: Option<&std::path::Path>,
) -> Result<Key, Error> {
    let key_data = std::fs::read(key_path)?;
    let mut key = loader::load_rsa_private_auto(&key_data)?;
    let cert_der = loader::load_certificate_auto(&std::fs::read(cert_path)?)?;
    key = key.with_cert(cert_der);
    if let Some(issuer) = issuer_path {
        let issuer_der = loader::load_certificate_auto(&std::fs::read(issuer)?)?;
        key = key.with_cert(issuer_der);
    }
    Ok(key)
}
