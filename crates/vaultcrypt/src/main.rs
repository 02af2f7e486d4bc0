use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use vaultcrypt_client::{BuildError, EncryptionClient, EncryptionError, KeyOperations};
use vaultcrypt_core::{AzureConfig, ConfigError, EncryptionAlgorithm, IdentifierError, KeyIdentifier};

mod chunk;
mod ui;

#[derive(Debug, Parser)]
#[command(
    name = "vaultcrypt",
    version,
    about = "Encrypt and decrypt small payloads with an Azure Key Vault key"
)]
struct Cli {
    /// Key identifier URL (overrides AZURE_KEY_VAULT_KEY_IDENTIFIER).
    #[arg(long, global = true)]
    key_id: Option<String>,

    /// Encryption algorithm: RSA-OAEP-256, RSA-OAEP or RSA1_5 (overrides VAULTCRYPT_ALGORITHM).
    #[arg(long, global = true)]
    algorithm: Option<EncryptionAlgorithm>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Parse a key identifier and print its parts. No network access.
    ParseKey {
        /// Key identifier, e.g. https://myvault.vault.azure.net/keys/myKey/<version>.
        identifier: String,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Encrypt stdin (or a file) and print one ciphertext token per line.
    Encrypt {
        /// Read plaintext from this file instead of stdin.
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,

        /// RSA key size in bits, used to size blocks.
        #[arg(long, default_value_t = chunk::DEFAULT_KEY_SIZE_BITS)]
        key_size: usize,
    },
    /// Decrypt ciphertext tokens (one per line) and write the plaintext to stdout.
    Decrypt {
        /// Read tokens from this file instead of stdin.
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },
    /// Encrypt and decrypt a file block by block and verify every block.
    Roundtrip {
        /// File to round-trip.
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Block size in bytes (default: the algorithm's limit for --key-size).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// RSA key size in bits.
        #[arg(long, default_value_t = chunk::DEFAULT_KEY_SIZE_BITS)]
        key_size: usize,

        /// Also write the decrypted data to stdout.
        #[arg(long, default_value_t = false)]
        print: bool,
    },
}

/// Errors surfaced by the CLI. Every one aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("round trip mismatch in chunk {index}")]
    RoundtripMismatch { index: usize },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> CliError {
    let context = context.into();
    move |source| CliError::Io { context, source }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("vaultcrypt: {}", report(&e));
        std::process::exit(1);
    }
}

/// Render an error and its source chain on one line.
fn report(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Parsing needs neither credentials nor network.
    if let Cmd::ParseKey { identifier, json } = &cli.cmd {
        return parse_key(identifier, *json);
    }

    let mut config = AzureConfig::from_env()?;
    apply_overrides(&mut config, cli.key_id, cli.algorithm);
    let client = EncryptionClient::from_config(&config)?;
    info!("using key {} with {}", client.key(), client.algorithm());

    match cli.cmd {
        Cmd::ParseKey { .. } => Ok(()),
        Cmd::Encrypt { input, key_size } => {
            let data = read_input(input.as_deref()).await?;
            let size = chunk::chunk_size(client.algorithm(), key_size, None)?;
            let tokens = encrypt_payload(&client, &data, size).await?;
            let mut out = tokio::io::stdout();
            for token in tokens {
                out.write_all(token.as_bytes())
                    .await
                    .map_err(io_error("failed to write stdout"))?;
                out.write_all(b"\n")
                    .await
                    .map_err(io_error("failed to write stdout"))?;
            }
            out.flush().await.map_err(io_error("failed to write stdout"))
        }
        Cmd::Decrypt { input } => {
            let data = read_input(input.as_deref()).await?;
            let text = String::from_utf8(data).map_err(|_| EncryptionError::TokenNotUtf8)?;
            let plaintext = decrypt_tokens(&client, &text).await?;
            let mut out = tokio::io::stdout();
            out.write_all(&plaintext)
                .await
                .map_err(io_error("failed to write stdout"))?;
            out.flush().await.map_err(io_error("failed to write stdout"))
        }
        Cmd::Roundtrip {
            file,
            chunk_size,
            key_size,
            print,
        } => {
            let data = read_input(Some(file.as_path())).await?;
            let size = chunk::chunk_size(client.algorithm(), key_size, chunk_size)?;
            let decrypted = roundtrip(&client, &data, size).await?;

            // With --print, stdout carries only the payload.
            if print {
                let mut out = tokio::io::stdout();
                out.write_all(&decrypted)
                    .await
                    .map_err(io_error("failed to write stdout"))?;
                out.flush().await.map_err(io_error("failed to write stdout"))?;
            } else {
                ui::header("Round trip");
                ui::kv("file", &file.display().to_string());
                ui::kv("key", &client.key().to_string());
                ui::kv("algorithm", client.algorithm().as_str());
                ui::kv("bytes", &data.len().to_string());
                ui::kv("chunks", &chunk::chunk_count(data.len(), size).to_string());
                ui::kv("chunk size", &size.to_string());
                ui::success("Every chunk decrypted back to its input");
            }
            Ok(())
        }
    }
}

fn apply_overrides(
    config: &mut AzureConfig,
    key_id: Option<String>,
    algorithm: Option<EncryptionAlgorithm>,
) {
    if let Some(key_id) = key_id {
        config.key_identifier = key_id;
    }
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm;
    }
}

fn parse_key(identifier: &str, json: bool) -> Result<(), CliError> {
    let key = KeyIdentifier::parse(identifier)?;
    if json {
        let rendered = serde_json::to_string_pretty(&key).map_err(|e| CliError::Io {
            context: "failed to render JSON".into(),
            source: e.into(),
        })?;
        println!("{rendered}");
    } else {
        ui::header("Key identifier");
        ui::kv("vault", key.vault_base_url());
        ui::kv("key name", key.key_name());
        ui::kv(
            "key version",
            if key.has_version() {
                key.key_version()
            } else {
                "(current)"
            },
        );
    }
    Ok(())
}

/// Read a whole file, or stdin when `path` is `None`.
async fn read_input(path: Option<&Path>) -> Result<Vec<u8>, CliError> {
    match path {
        Some(path) => tokio::fs::read(path)
            .await
            .map_err(io_error(format!("failed to read {}", path.display()))),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .map_err(io_error("failed to read stdin"))?;
            Ok(buf)
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Encrypt `data` block by block; one token per block.
async fn encrypt_payload<T: KeyOperations>(
    client: &EncryptionClient<T>,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<String>, CliError> {
    let mut tokens = Vec::with_capacity(chunk::chunk_count(data.len(), chunk_size));
    for block in data.chunks(chunk_size) {
        tokens.push(client.encrypt(block).await?);
    }
    debug!("encrypted {} bytes into {} tokens", data.len(), tokens.len());
    Ok(tokens)
}

/// Decrypt newline-separated tokens and concatenate the plaintext.
async fn decrypt_tokens<T: KeyOperations>(
    client: &EncryptionClient<T>,
    text: &str,
) -> Result<Vec<u8>, CliError> {
    let mut plaintext = Vec::new();
    for token in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        plaintext.extend(client.decrypt(token).await?);
    }
    Ok(plaintext)
}

/// Encrypt then decrypt every block of `data`, failing on the first block
/// that does not come back unchanged. Returns the reassembled plaintext.
async fn roundtrip<T: KeyOperations>(
    client: &EncryptionClient<T>,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>, CliError> {
    let pb = ui::chunk_progress(chunk::chunk_count(data.len(), chunk_size) as u64);
    let mut out = Vec::with_capacity(data.len());

    for (index, block) in data.chunks(chunk_size).enumerate() {
        let result = async {
            let token = client.encrypt_bytes(block).await?;
            let decrypted = client.decrypt_bytes(&token).await?;
            Ok::<_, CliError>(decrypted)
        }
        .await;

        let decrypted = match result {
            Ok(decrypted) => decrypted,
            Err(e) => {
                ui::progress_error(&pb, &format!("chunk {index} failed"));
                return Err(e);
            }
        };
        if decrypted != block {
            ui::progress_error(&pb, &format!("chunk {index} did not round-trip"));
            return Err(CliError::RoundtripMismatch { index });
        }
        debug!("chunk {index}: {} bytes ok", block.len());
        out.extend_from_slice(&decrypted);
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vaultcrypt_client::encryption::OperationFuture;
    use vaultcrypt_client::{KeyOperation, VaultApiError};

    const KEY_ID: &str = "https://myvault.vault.azure.net/keys/myKey/99d67321dd9841af859129cd5551a871";

    /// Reversible fake vault. `corrupt` flips the first decrypted byte.
    #[derive(Default)]
    struct FakeVault {
        calls: AtomicUsize,
        corrupt: bool,
    }

    impl KeyOperations for FakeVault {
        fn apply<'a>(
            &'a self,
            _key: &'a KeyIdentifier,
            op: KeyOperation,
            _alg: EncryptionAlgorithm,
            value: &'a str,
        ) -> OperationFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let corrupt = self.corrupt;
            Box::pin(async move {
                match op {
                    KeyOperation::Encrypt => Ok(value.chars().rev().collect()),
                    KeyOperation::Decrypt => {
                        let mut plain: String = value.chars().rev().collect();
                        if corrupt {
                            let replacement = if plain.starts_with('A') { "B" } else { "A" };
                            plain.replace_range(..1, replacement);
                        }
                        Ok(plain)
                    }
                }
            })
        }
    }

    struct DownVault;

    impl KeyOperations for DownVault {
        fn apply<'a>(
            &'a self,
            _key: &'a KeyIdentifier,
            _op: KeyOperation,
            _alg: EncryptionAlgorithm,
            _value: &'a str,
        ) -> OperationFuture<'a> {
            Box::pin(async { Err(VaultApiError::ServerError) })
        }
    }

    fn client<T: KeyOperations>(transport: T) -> EncryptionClient<T> {
        EncryptionClient::new(
            transport,
            KeyIdentifier::parse(KEY_ID).unwrap(),
            EncryptionAlgorithm::Rsa1_5,
        )
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn cli_parses_global_overrides() {
        let cli = Cli::try_parse_from([
            "vaultcrypt",
            "roundtrip",
            "--file",
            "state.tfstate",
            "--algorithm",
            "rsa1_5",
            "--key-id",
            KEY_ID,
        ])
        .unwrap();
        assert_eq!(cli.algorithm, Some(EncryptionAlgorithm::Rsa1_5));
        assert_eq!(cli.key_id.as_deref(), Some(KEY_ID));
        assert!(matches!(
            cli.cmd,
            Cmd::Roundtrip { chunk_size: None, key_size: 2048, print: false, .. }
        ));
    }

    #[test]
    fn cli_rejects_unknown_algorithm() {
        assert!(Cli::try_parse_from(["vaultcrypt", "encrypt", "--algorithm", "AES"]).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = AzureConfig::from_lookup(|name| {
            let value = match name {
                "AZURE_CLIENT_ID" => Some("c"),
                "AZURE_CLIENT_SECRET" => Some("s"),
                "AZURE_TENANT_ID" => Some("t"),
                "AZURE_KEY_VAULT_KEY_IDENTIFIER" => Some("https://a.vault.azure.net/keys/k"),
                _ => None,
            };
            value.map(str::to_owned)
        })
        .unwrap();

        apply_overrides(&mut config, None, None);
        assert_eq!(config.key_identifier, "https://a.vault.azure.net/keys/k");
        assert_eq!(config.algorithm, EncryptionAlgorithm::RsaOaep256);

        apply_overrides(
            &mut config,
            Some(KEY_ID.to_owned()),
            Some(EncryptionAlgorithm::RsaOaep),
        );
        assert_eq!(config.key_identifier, KEY_ID);
        assert_eq!(config.algorithm, EncryptionAlgorithm::RsaOaep);
    }

    #[test]
    fn parse_key_rejects_malformed_identifier() {
        let err = parse_key("not-a-url", false).unwrap_err();
        assert!(matches!(err, CliError::Identifier(_)));
    }

    #[tokio::test]
    async fn roundtrip_covers_every_chunk() {
        let vault = client(FakeVault::default());
        let data = sample(1000);
        let out = roundtrip(&vault, &data, 245).await.unwrap();
        assert_eq!(out, data);
        // Five chunks, two calls each.
        assert_eq!(vault.transport().calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn roundtrip_of_empty_file_makes_no_calls() {
        let vault = client(FakeVault::default());
        assert!(roundtrip(&vault, &[], 245).await.unwrap().is_empty());
        assert_eq!(vault.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn roundtrip_detects_mismatch() {
        let vault = client(FakeVault {
            corrupt: true,
            ..FakeVault::default()
        });
        let err = roundtrip(&vault, &sample(300), 245).await.unwrap_err();
        assert!(matches!(err, CliError::RoundtripMismatch { index: 0 }));
    }

    #[tokio::test]
    async fn roundtrip_propagates_remote_failure() {
        let vault = client(DownVault);
        let err = roundtrip(&vault, &sample(10), 245).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Encryption(EncryptionError::RemoteOperationFailed(
                VaultApiError::ServerError
            ))
        ));
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_tokens() {
        let vault = client(FakeVault::default());
        let data = sample(600);
        let tokens = encrypt_payload(&vault, &data, 245).await.unwrap();
        assert_eq!(tokens.len(), 3);

        let text = format!("{}\n\n{}\r\n", tokens[..2].join("\n"), tokens[2]);
        let plaintext = decrypt_tokens(&vault, &text).await.unwrap();
        assert_eq!(plaintext, data);
    }

    #[tokio::test]
    async fn read_input_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"terraform state").unwrap();
        let data = read_input(Some(file.path())).await.unwrap();
        assert_eq!(data, b"terraform state");
    }

    #[tokio::test]
    async fn read_input_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.tfstate");
        let err = read_input(Some(missing.as_path())).await.unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
        assert!(err.to_string().contains("missing.tfstate"));
    }

    #[tokio::test]
    async fn report_includes_each_cause_once() {
        let vault = client(DownVault);
        let err = encrypt_payload(&vault, b"payload", 245).await.unwrap_err();
        assert_eq!(
            report(&err),
            "remote key operation failed: Key Vault server error"
        );

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.bin");
        let err = read_input(Some(missing.as_path())).await.unwrap_err();
        let rendered = report(&err);
        assert_eq!(rendered.matches("gone.bin").count(), 1);
        assert!(rendered.len() > err.to_string().len());
    }
}
