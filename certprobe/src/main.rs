//! certprobe: Command-line tool for probing TLS servers and classifying
//! problems in the certificate chains they present.

use anyhow::{Context, Result};
use certprobe_lib::{
    is_valid_domain, parse_pem_chain, probe, unix_now, validate_presented, ErrorCode, ProbeConfig,
    ProbeError, Verdict, DEFAULT_PORT, MAX_CHAIN_HOPS,
};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "certprobe",
    about = "Probe TLS servers and report certificate-chain problems",
    long_about = "certprobe connects to each server, captures the certificate chain it\n\
                  presents without trusting it, and reports the first structural problem\n\
                  found: no certificate, expiry, a missing intermediate, a hostname or\n\
                  issuer mismatch, or a root that is not self-signed.\n\n\
                  Every result carries a stable numeric code (0 = valid).",
    after_help = "EXAMPLES:\n\
                  \n  certprobe probe www.example.com\
                  \n  certprobe probe --json www.example.com api.example.com\
                  \n  certprobe probe --file domains.txt --failures-only\
                  \n  certprobe chain --hostname www.example.com chain.pem\
                  \n  cat chain.pem | certprobe chain --hostname www.example.com"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to servers and classify their certificate chains
    /// (exit 0 = all valid, 2 = any chain problem, 1 = bad input or internal error)
    #[command(after_help = "CODES:\n\
                      \n    0  Success\
                      \n  400  Invalid parameter\
                      \n  401  No certificate presented\
                      \n  402  Missing intermediate certificate(s)\
                      \n  403  Validation failed (hostname, issuer/subject, root)\
                      \n  404  Certificate expired\
                      \n  405  Connection failed\
                      \n  406  Connection timeout\
                      \n  500  Internal error\
                      \n\nEXAMPLES:\n\
                      \n  certprobe probe www.example.com\
                      \n  certprobe probe --port 8443 --timeout 5s internal.example.com\
                      \n  certprobe probe --jobs 32 --file domains.txt")]
    Probe {
        /// Hostnames or IP literals to probe
        domains: Vec<String>,
        /// File with one domain per line (`#` comments allowed, `-` for stdin)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// TCP port to connect to
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Bound on resolve, connect and handshake (e.g. 10s, 1500ms, 10)
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        timeout: Duration,
        /// Maximum issuer links followed when ordering the chain
        #[arg(long, value_name = "N", default_value_t = MAX_CHAIN_HOPS)]
        max_hops: usize,
        /// Number of servers probed concurrently
        #[arg(short, long, value_name = "N", default_value_t = 8)]
        jobs: usize,
        /// Output the JSON response envelope for each domain
        #[arg(long)]
        json: bool,
        /// Only print failures
        #[arg(long)]
        failures_only: bool,
    },
    /// Validate a captured PEM chain offline (leaf first)
    #[command(after_help = "FILE is a PEM bundle with the leaf certificate first. The same\n\
                      walker and checks used for live probes are applied.\n\
                      \nEXAMPLES:\n\
                      \n  certprobe chain --hostname www.example.com chain.pem\
                      \n  certprobe chain --hostname www.example.com --at-time 1893456000 chain.pem\
                      \n  cat chain.pem | certprobe chain --hostname www.example.com --json")]
    Chain {
        /// PEM file with the certificate chain. Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Hostname the leaf certificate must cover
        #[arg(long)]
        hostname: String,
        /// Evaluate expiry at a specific Unix timestamp instead of now
        #[arg(long, value_name = "EPOCH")]
        at_time: Option<i64>,
        /// Maximum issuer links followed when ordering the chain
        #[arg(long, value_name = "N", default_value_t = MAX_CHAIN_HOPS)]
        max_hops: usize,
        /// Output the JSON response envelope
        #[arg(long)]
        json: bool,
    },
}

/// Maximum input size (10 MiB) to prevent unbounded memory allocation.
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Read from `file`, or stdin when it is absent or `-`.
fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

/// Parse a duration from plain seconds or humantime notation.
fn parse_duration(s: &str) -> Result<Duration> {
    if s.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = s.parse().context("Invalid duration value")?;
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))
}

/// One domain per line; blank lines and `#` comments are skipped.
fn parse_domain_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_domains(path: &Path) -> Result<Vec<String>> {
    let input = read_input(Some(&path.to_path_buf()))?;
    let text = String::from_utf8(input)
        .with_context(|| format!("Domain list is not UTF-8: {}", path.display()))?;
    Ok(parse_domain_list(&text))
}

/// Trim and syntax-check a domain before any network activity.
fn check_domain(raw: &str) -> Result<String, ProbeError> {
    let domain = raw.trim();
    if domain.is_empty() {
        return Err(ProbeError::InvalidParameter(
            "Missing required parameter: domain".into(),
        ));
    }
    let bare = domain
        .strip_prefix('[')
        .and_then(|d| d.strip_suffix(']'))
        .unwrap_or(domain);
    if !is_valid_domain(bare) {
        return Err(ProbeError::InvalidParameter("Invalid domain format".into()));
    }
    Ok(domain.to_string())
}

/// Probe every domain with at most `jobs` handshakes in flight.
///
/// Results come back in input order.
async fn probe_all(
    domains: Vec<String>,
    config: ProbeConfig,
    jobs: usize,
) -> Vec<(String, Verdict)> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let config = Arc::new(config);
    let mut set = JoinSet::new();

    for (index, raw) in domains.iter().enumerate() {
        let raw = raw.clone();
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        set.spawn(async move {
            let verdict = match check_domain(&raw) {
                Ok(domain) => {
                    let _permit = semaphore.acquire_owned().await.ok();
                    debug!(domain = %domain, "probing");
                    probe(&domain, &config).await
                }
                Err(e) => Verdict::from(e),
            };
            (index, verdict)
        });
    }

    let mut verdicts: Vec<Option<Verdict>> = domains.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, verdict)) => {
                if let Some(slot) = verdicts.get_mut(index) {
                    *slot = Some(verdict);
                }
            }
            Err(e) => warn!(error = %e, "probe task failed"),
        }
    }

    domains
        .into_iter()
        .zip(verdicts)
        .map(|(domain, verdict)| {
            let verdict = verdict.unwrap_or_else(|| {
                Verdict::from(ProbeError::Internal("probe task failed".into()))
            });
            (domain, verdict)
        })
        .collect()
}

/// Print one result. Failures go to stderr in text mode.
fn print_verdict(domain: &str, verdict: &Verdict, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&verdict.to_response(domain))?
        );
    } else if verdict.is_valid() {
        println!("{}: {}", domain, verdict);
    } else {
        eprintln!("{}: {}", domain, verdict);
    }
    Ok(())
}

/// 0 when everything is valid, 1 when any probe could not run, 2 otherwise.
fn exit_code<I>(codes: I) -> i32
where
    I: IntoIterator<Item = ErrorCode>,
{
    let mut status = 0;
    for code in codes {
        if !code.is_probe_outcome() {
            return 1;
        }
        if code != ErrorCode::Success {
            status = 2;
        }
    }
    status
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("certprobe={default},certprobe_lib={default},rustls=warn").into()
    });
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Probe {
            mut domains,
            file,
            port,
            timeout,
            max_hops,
            jobs,
            json,
            failures_only,
        } => {
            if let Some(path) = &file {
                domains.extend(load_domains(path)?);
            }
            if domains.is_empty() {
                // A missing domain is reported like any other parameter error.
                domains.push(String::new());
            }

            let config = ProbeConfig {
                port,
                timeout,
                max_hops,
            };
            let results = probe_all(domains, config, jobs).await;

            for (domain, verdict) in &results {
                if failures_only && verdict.is_valid() {
                    continue;
                }
                print_verdict(domain, verdict, json)?;
            }
            let status = exit_code(results.iter().map(|(_, v)| v.code()));
            if status != 0 {
                std::process::exit(status);
            }
        }
        Commands::Chain {
            file,
            hostname,
            at_time,
            max_hops,
            json,
        } => {
            let input = read_input(file.as_ref())?;
            let ders = parse_pem_chain(&input).context("Failed to read certificate chain")?;
            let now = at_time.unwrap_or_else(unix_now);
            let verdict = Verdict::from(validate_presented(&ders, &hostname, now, max_hops));

            print_verdict(&hostname, &verdict, json)?;
            let status = exit_code([verdict.code()]);
            if status != 0 {
                std::process::exit(status);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::io::Write;

    // ---- Durations ----

    #[test]
    fn parse_plain_seconds() {
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn parse_humantime_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn reject_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-5").is_err());
        assert!(parse_duration("soon").is_err());
    }

    // ---- Domain input ----

    #[test]
    fn domain_list_skips_comments_and_blanks() {
        let text = "# production\nwww.example.com\n\n  api.example.com  # edge\n#\n";
        assert_eq!(
            parse_domain_list(text),
            vec!["www.example.com".to_string(), "api.example.com".to_string()]
        );
    }

    #[test]
    fn domain_list_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a.example.com\n# skipped\nb.example.com").unwrap();
        let domains = load_domains(file.path()).unwrap();
        assert_eq!(domains, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn missing_domain_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_domains(&dir.path().join("absent.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to stat file"));
    }

    #[test]
    fn check_domain_trims_and_accepts_literals() {
        assert_eq!(check_domain("  www.example.com ").unwrap(), "www.example.com");
        assert_eq!(check_domain("192.0.2.1").unwrap(), "192.0.2.1");
        assert_eq!(check_domain("[2001:db8::1]").unwrap(), "[2001:db8::1]");
    }

    #[test]
    fn check_domain_rejects_missing_and_malformed() {
        let err = check_domain("   ").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
        assert_eq!(err.to_string(), "Missing required parameter: domain");

        let err = check_domain("bad domain!").unwrap_err();
        assert_eq!(err.to_string(), "Invalid domain format");
        assert!(check_domain("-leading.example.com").is_err());
    }

    #[tokio::test]
    async fn invalid_domains_are_reported_without_probing() {
        let results = probe_all(
            vec!["".into(), "no spaces allowed".into()],
            ProbeConfig::default(),
            2,
        )
        .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.code(), ErrorCode::InvalidParameter);
        assert_eq!(results[1].0, "no spaces allowed");
        assert_eq!(results[1].1.message(), "Invalid domain format");
    }

    // ---- Exit status ----

    #[test]
    fn exit_code_all_valid() {
        assert_eq!(exit_code([ErrorCode::Success, ErrorCode::Success]), 0);
        assert_eq!(exit_code(Vec::new()), 0);
    }

    #[test]
    fn exit_code_chain_problems() {
        assert_eq!(exit_code([ErrorCode::Success, ErrorCode::Expired]), 2);
        assert_eq!(exit_code([ErrorCode::Timeout]), 2);
    }

    #[test]
    fn exit_code_probe_could_not_run() {
        assert_eq!(exit_code([ErrorCode::Expired, ErrorCode::InvalidParameter]), 1);
        assert_eq!(exit_code([ErrorCode::InternalError]), 1);
    }
}
