// Helper functions shared by resolvers, fetcher and extractor

use std::process::Stdio;

use rand::Rng;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};
use url::Url;

/// Alphabet of the content-playback-nonce
const CPN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate a 16 character content-playback-nonce
pub fn generate_cpn() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| CPN_ALPHABET[rng.gen_range(0..CPN_ALPHABET.len())] as char)
        .collect()
}

/// Set a query parameter, replacing any existing value for the key
pub fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}

/// Cut a string to at most `max` characters (char boundary safe)
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Last `max_lines` non-empty lines of process output
pub fn tail_lines(output: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join(" | ")
}

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, String> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to start {}: {}", program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| format!("Failed to capture stdout from {}", program))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| format!("Failed to capture stderr from {}", program))?;

    let collect = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out_res, err_res, status) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout),
            stderr_pipe.read_to_end(&mut stderr),
            child.wait()
        );
        out_res.map_err(|e| format!("Failed to read stdout: {}", e))?;
        err_res.map_err(|e| format!("Failed to read stderr: {}", e))?;
        let status = status.map_err(|e| format!("Failed to wait for {}: {}", program, e))?;
        Ok::<_, String>(std::process::Output {
            status,
            stdout,
            stderr,
        })
    };

    match timeout(Duration::from_secs(timeout_secs), collect).await {
        Ok(output) => output,
        // child is dropped with kill_on_drop(true)
        Err(_) => Err(format!("Timed out after {}s", timeout_secs)),
    }
}
