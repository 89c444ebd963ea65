//! Filter plugin binary for integration tests
//!
//! Built on the crate's own plugin server half. The behavior is selected by
//! the first argument:
//!
//! - `first` -- keep only the first issuance
//! - `last` -- keep only the last issuance
//! - `keep-id <n>` -- keep only the issuance with identifier `n`
//! - `fail` -- answer every call with a filter error
//! - `passthrough` (default) -- keep everything
//!
//! Filter references carry no arguments, so tests wrap this binary in a
//! small shell script that supplies them.

use async_trait::async_trait;

use ct_monitor::certspotter::Issuance;
use ct_monitor::filter::{server, IssuanceFilter};

#[derive(Debug)]
enum Mode {
    First,
    Last,
    KeepId(u64),
    Fail,
    Passthrough,
}

#[derive(Debug)]
struct TestFilter {
    mode: Mode,
}

#[async_trait]
impl IssuanceFilter for TestFilter {
    fn name(&self) -> &str {
        "ct_monitor_test_filter"
    }

    async fn filter(&self, issuances: Vec<Issuance>) -> anyhow::Result<Vec<Issuance>> {
        eprintln!("test filter received {} issuances", issuances.len());
        match self.mode {
            Mode::First => Ok(issuances.into_iter().take(1).collect()),
            Mode::Last => Ok(issuances.into_iter().last().into_iter().collect()),
            Mode::KeepId(id) => Ok(issuances.into_iter().filter(|i| i.id == id).collect()),
            Mode::Fail => anyhow::bail!("test filter configured to fail"),
            Mode::Passthrough => Ok(issuances),
        }
    }
}

fn parse_mode(args: &[String]) -> anyhow::Result<Mode> {
    match args.first().map(String::as_str) {
        None | Some("passthrough") => Ok(Mode::Passthrough),
        Some("first") => Ok(Mode::First),
        Some("last") => Ok(Mode::Last),
        Some("fail") => Ok(Mode::Fail),
        Some("keep-id") => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("keep-id requires an identifier"))?
                .parse()?;
            Ok(Mode::KeepId(id))
        }
        Some(other) => anyhow::bail!("unknown mode `{}`", other),
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match parse_mode(&args) {
        Ok(mode) => server::serve(TestFilter { mode }).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("ct_monitor_test_filter: {}", e);
        std::process::exit(1);
    }
}
