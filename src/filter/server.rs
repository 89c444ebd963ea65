//! Plugin half of the filter protocol
//!
//! Link against this crate and call [`serve`] from `main` to turn any
//! [`IssuanceFilter`] into a plugin executable:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use ct_monitor::certspotter::Issuance;
//! use ct_monitor::filter::{server, IssuanceFilter};
//!
//! #[derive(Debug)]
//! struct DropPrecerts;
//!
//! #[async_trait]
//! impl IssuanceFilter for DropPrecerts {
//!     fn name(&self) -> &str { "drop-precerts" }
//!     async fn filter(&self, issuances: Vec<Issuance>) -> anyhow::Result<Vec<Issuance>> {
//!         Ok(issuances.into_iter().filter(|i| i.cert.cert_type != "precert").collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     server::serve(DropPrecerts).await
//! }
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::certspotter::Issuance;
use crate::error::{CtMonitorError, Result};
use crate::filter::handshake::Handshake;
use crate::filter::rpc::{
    JsonRpcRequest, JsonRpcResponse, FILTER_FAILED, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::filter::{IssuanceFilter, FILTER_METHOD, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};

/// Serve `filter` over the process's stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns `CtMonitorError::FilterHandshake` when the magic cookie is not
/// present in the environment, which means the binary was not launched by
/// the monitor.
pub async fn serve<F: IssuanceFilter>(filter: F) -> Result<()> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(v) if v == MAGIC_COOKIE_VALUE => {}
        _ => {
            return Err(CtMonitorError::FilterHandshake(
                "this binary is a ct-monitor filter plugin and is not meant to be run directly"
                    .to_string(),
            )
            .into())
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_io(&filter, stdin, stdout).await
}

/// Write the handshake, then answer requests read from `reader` until EOF.
pub async fn serve_io<F, R, W>(filter: &F, reader: R, mut writer: W) -> Result<()>
where
    F: IssuanceFilter + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{}\n", Handshake::current()).as_bytes())
        .await?;
    writer.flush().await?;

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(filter, &line).await;
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn handle_line<F: IssuanceFilter + ?Sized>(filter: &F, line: &str) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return JsonRpcResponse::failure(None, PARSE_ERROR, e.to_string()),
    };

    if request.method != FILTER_METHOD {
        return JsonRpcResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("method `{}` not found", request.method),
        );
    }

    let params = request.params.unwrap_or_else(|| serde_json::json!([]));
    let issuances: Vec<Issuance> = match serde_json::from_value(params) {
        Ok(v) => v,
        Err(e) => return JsonRpcResponse::failure(request.id, INVALID_PARAMS, e.to_string()),
    };

    match filter.filter(issuances).await {
        Ok(kept) => match serde_json::to_value(&kept) {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => JsonRpcResponse::failure(request.id, FILTER_FAILED, e.to_string()),
        },
        Err(e) => JsonRpcResponse::failure(request.id, FILTER_FAILED, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct KeepEven;

    #[async_trait]
    impl IssuanceFilter for KeepEven {
        fn name(&self) -> &str {
            "keep-even"
        }
        async fn filter(&self, issuances: Vec<Issuance>) -> Result<Vec<Issuance>> {
            if issuances.iter().any(|i| i.id == 0) {
                anyhow::bail!("zero id is not allowed");
            }
            Ok(issuances.into_iter().filter(|i| i.id % 2 == 0).collect())
        }
    }

    async fn run(input: &str) -> Vec<String> {
        let mut out = Vec::new();
        serve_io(&KeepEven, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_is_first_line() {
        let lines = run("").await;
        assert_eq!(lines, vec!["1|1|stdio|jsonrpc".to_string()]);
    }

    #[tokio::test]
    async fn test_filter_request_returns_kept_issuances() {
        let req = r#"{"jsonrpc":"2.0","id":1,"method":"Plugin.Filter","params":[{"id":"1"},{"id":"2"}]}"#;
        let lines = run(&format!("{}\n", req)).await;
        assert_eq!(lines.len(), 2);

        let resp: JsonRpcResponse = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(resp.id, Some(serde_json::json!(1)));
        let kept: Vec<Issuance> = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }

    #[tokio::test]
    async fn test_unknown_method_is_rejected() {
        let req = r#"{"jsonrpc":"2.0","id":7,"method":"Plugin.Other","params":[]}"#;
        let lines = run(&format!("{}\n", req)).await;
        let resp: JsonRpcResponse = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_filter_error_is_reported() {
        let req = r#"{"jsonrpc":"2.0","id":2,"method":"Plugin.Filter","params":[{"id":"0"}]}"#;
        let lines = run(&format!("{}\n", req)).await;
        let resp: JsonRpcResponse = serde_json::from_str(&lines[1]).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, FILTER_FAILED);
        assert!(err.message.contains("zero id"));
    }

    #[tokio::test]
    async fn test_garbage_line_is_parse_error() {
        let lines = run("not json\n").await;
        let resp: JsonRpcResponse = serde_json::from_str(&lines[1]).unwrap();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_bad_params_are_rejected() {
        let req = r#"{"jsonrpc":"2.0","id":3,"method":"Plugin.Filter","params":{"id":"1"}}"#;
        let lines = run(&format!("{}\n", req)).await;
        let resp: JsonRpcResponse = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }
}
