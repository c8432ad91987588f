//! Catalogue-to-map reduction tool.
//!
//! Streams a delimited galaxy shape catalogue and reduces it into HEALPix
//! statistic maps: overdensity, mean ellipticities, inverse-variance
//! weights, and an updated validity mask.
//!
//! Usage:
//! ```
//! cargo run --release --bin catmap -- run.toml
//! ```

use clap::Parser;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "catmap")]
#[command(about = "Project a galaxy shape catalogue onto sky statistic maps")]
#[command(version)]
struct Args {
    /// Path to the run configuration file (TOML)
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let Some(config_path) = args.config else {
        println!("No configuration supplied. Try catmap --help");
        return ExitCode::SUCCESS;
    };

    match catmap::pipeline::run_from_path(&config_path) {
        Ok(report) => {
            println!(
                "{} records read, {} accumulated over {} pixels (mean count {:.6})",
                report.records_seen, report.records_kept, report.observed_pixels, report.n_bar
            );
            if let Some(validation) = &report.validation {
                println!(
                    "validation: mismatch fractions e1 {:.6e} / e2 {:.6e}, sky fraction {:.6}",
                    validation.mismatch_fraction_e1,
                    validation.mismatch_fraction_e2,
                    validation.sky_fraction
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
