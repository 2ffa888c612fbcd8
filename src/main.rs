#[macro_use]
extern crate log;

mod http;
mod report;
mod tracker;

use crate::http::{Fetch, Http};
use crate::tracker::{Endpoints, Source};

use anyhow::{Context, Error};
use env_logger::Env;
use std::io::{stdout, Write};
use std::rc::Rc;
use structopt::StructOpt;
use url::Url;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    rename_all = "kebab",
    about = "Pull bugs from GitHub/Bugzilla and dump them as CSV to stdout",
    after_help = "\
    Set RUST_LOG=bughub=debug in the environment to get full logging output.
    "
)]
pub struct Opt {
    /// Increase log verbosity (may be given several times)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
    /// GitHub API base URL
    #[structopt(
        long,
        value_name = "URL",
        env = "BUGHUB_GITHUB_API",
        default_value = "https://api.github.com/"
    )]
    github_api: Url,
    /// Bugzilla REST API bug endpoint
    #[structopt(
        long,
        value_name = "URL",
        env = "BUGHUB_BUGZILLA_API",
        default_value = "https://api-dev.bugzilla.mozilla.org/latest/bug"
    )]
    bugzilla_api: Url,
    /// Source definitions
    ///
    /// Format: "github:USER:REPO:FIELD=VAL..." or "bugzilla:FIELD=VAL...". Repeating a
    /// FIELD sends all of its values.
    /// Examples: "github:mozilla:pdf.js:state=open" or "bugzilla:product=Core:status=NEW"
    #[structopt(value_name = "SOURCE", required = true)]
    sources: Vec<String>,
}

impl Opt {
    fn endpoints(&self) -> Endpoints {
        Endpoints {
            github: self.github_api.clone(),
            bugzilla: self.bugzilla_api.clone(),
        }
    }
}

/// Maps the number of `-v` flags to a log level, starting at "warn"
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn run(opt: &Opt) -> Result<()> {
    let fetch: Rc<dyn Fetch> = Rc::new(Http::new().context("Cannot set up HTTP client")?);
    let endpoints = opt.endpoints();
    let sources = opt
        .sources
        .iter()
        .map(|def| {
            Source::parse(def, &endpoints, fetch.clone())
                .with_context(|| format!("Invalid source definition `{}'", def))
        })
        .collect::<Result<Vec<_>>>()?;
    let n = report::write_csv(&sources, stdout().lock())?;
    info!("Wrote {} row(s)", n);
    Ok(())
}

fn main() {
    dotenv::dotenv().ok();
    let opt = Opt::from_args();
    env_logger::from_env(Env::default().default_filter_or(log_level(opt.verbose)))
        .format(|buf, rec| {
            writeln!(buf, "{} - {} - {}", rec.target(), rec.level(), rec.args())
        })
        .init();
    if let Err(err) = run(&opt) {
        for e in err.chain() {
            error!("{}", e);
            // reqwest seems to fold all causes into its head error
            if e.downcast_ref::<reqwest::Error>().is_some() {
                break;
            }
        }
        std::process::exit(1);
    }
}
