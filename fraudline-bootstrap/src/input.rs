use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

use fraudline_domain::{Owner, Transaction};

/// One line of the JSONL input feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestRequest {
    pub transaction: Transaction,
    pub owner: Owner,
}

/// Reads requests from a file, or from stdin when `path` is `-`.
/// Lines that fail to decode are logged and skipped.
pub async fn read_requests(path: &str) -> Result<Vec<IngestRequest>> {
    if path == "-" {
        return read_from(tokio::io::stdin()).await;
    }
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open input {}", path))?;
    read_from(file).await
}

pub async fn read_from<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<IngestRequest>> {
    let mut lines = BufReader::new(reader).lines();
    let mut requests = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<IngestRequest>(line) {
            Ok(request) => requests.push(request),
            Err(err) => warn!(line = line_no, error = %err, "skipping malformed input line"),
        }
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_blank_comment_and_malformed_lines() {
        let feed = concat!(
            "# sample feed\n",
            "\n",
            r#"{"transaction":{"id":1,"user_id":7,"amount":"120.50","currency":"USD","created_at":"2024-03-01T12:00:00Z"},"owner":{"id":7,"username":"ana"}}"#,
            "\n",
            "{not json}\n",
        );
        let requests = read_from(feed.as_bytes()).await.expect("read");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].owner.username, "ana");
        assert_eq!(requests[0].transaction.amount.to_string(), "120.50");
    }
}
