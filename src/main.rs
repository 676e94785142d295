// OfCheck: Semantic checks of OpenFlow controller configurations
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::{
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use flow_equiv::{
    compare::check_expiry, normalize::normalize_dump_output, validate::validate_flow,
    Comparator, Normalizer,
};
use itertools::Itertools;
use ofcheck::{
    runner::IDENTITY_KEYS, stress, Config, CreateMethod, Fixture, ResourceKind, RunOptions,
    Runner, StressOptions,
};
use ovs_lab::{select_flow, Controller};
use serde::Serialize;

/// Test the configuration interface of an OpenFlow controller against the flow table of the
/// switch.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Configuration file. If omitted, the file in `$OFCHECK_CONFIG` or the defaults are used.
    #[clap(long = "config", short = 'c')]
    config: Option<PathBuf>,
    /// Write the results as JSON into this file.
    #[clap(long = "json", short = 'j')]
    json: Option<PathBuf>,
    /// What to do
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the CRUD test cases of the fixtures in a directory.
    Run {
        /// Directory containing the fixtures (`f<N>.xml`, `g<N>.xml`, `m<N>.xml`).
        #[clap(default_value = "xmls")]
        dir: PathBuf,
        /// Only run fixtures of this kind. Can be given multiple times.
        #[clap(long = "kind", short = 'k', value_enum)]
        kinds: Vec<ResourceKind>,
        /// Only run fixtures with these numbers, like `1,3,34`.
        #[clap(long = "xmls", short = 'x', value_delimiter = ',')]
        numbers: Vec<u32>,
        /// How to create the resources: `put`, `post`, or `operations` to call the sal service
        #[clap(long = "method", short = 'm', value_enum, default_value = "put")]
        method: CreateMethod,
        /// Also test updating each resource.
        #[clap(long = "update", short = 'u')]
        update: bool,
        /// Do not check the flow table of the switch.
        #[clap(long = "no-switch")]
        no_switch: bool,
    },
    /// Validate the fields of flow fixtures, without talking to the controller.
    Validate {
        /// Fixture files
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Compare a flow fixture with a saved output of `ovs-ofctl dump-flows`.
    Compare {
        /// Fixture file
        fixture: PathBuf,
        /// File containing the dump
        dump: PathBuf,
    },
    /// Create many flows concurrently.
    Stress {
        /// Number of concurrent workers
        #[clap(long = "workers", short = 'w', default_value_t = num_cpus::get())]
        workers: usize,
        /// Number of flows created by each worker
        #[clap(long = "flows", short = 'n', default_value_t = 100)]
        flows: u32,
        /// Table into which the flows are written
        #[clap(long = "table", short = 't', default_value_t = 0)]
        table: u8,
        /// Timeout of each request. Defaults to the timeout of the configuration.
        #[clap(long = "timeout")]
        timeout_secs: Option<u64>,
        /// Delete the created flows at the end.
        #[clap(long = "cleanup")]
        cleanup: bool,
    },
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    pretty_env_logger::init_timed();

    let Cli {
        config,
        json,
        command,
    } = Cli::parse();
    let config = match config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    let keywords = config.keywords()?;
    let normalizer = Normalizer::new(&keywords);

    let success = match command {
        Command::Validate { files } => validate(normalizer, &files)?,
        Command::Compare { fixture, dump } => compare(normalizer, &fixture, &dump, json.as_deref())?,
        Command::Run {
            dir,
            kinds,
            numbers,
            method,
            update,
            no_switch,
        } => {
            let options = RunOptions {
                method,
                update,
                skip_switch: no_switch,
                ..RunOptions::with_delays(&config.controller)
            };
            let reports = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(async {
                    let controller = config.controller_client()?;
                    let switch = config.connect_switch().await?;
                    let runner = Runner::new(&controller, &switch, &keywords, &config.controller.node)
                        .options(options);
                    Ok::<_, Box<dyn Error>>(runner.run_dir(&dir, &kinds, &numbers).await?)
                })?;

            for report in &reports {
                println!("{report}");
            }
            let passed = reports.iter().filter(|r| r.passed()).count();
            println!("\n{passed} of {} test cases passed", reports.len());
            if passed < reports.len() {
                let failed = reports.iter().filter(|r| !r.passed()).map(|r| &r.name).join(", ");
                println!("failed: {failed}");
            }
            write_json(json.as_deref(), &reports)?;
            passed == reports.len()
        }
        Command::Stress {
            workers,
            flows,
            table,
            timeout_secs,
            cleanup,
        } => {
            let options = StressOptions {
                workers,
                flows_per_worker: flows,
                table,
                timeout: timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.controller.timeout()),
                cleanup,
            };
            let report = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(async {
                    let controller: Arc<dyn Controller> = Arc::new(config.controller_client()?);
                    Ok::<_, Box<dyn Error>>(
                        stress::run(controller, &config.controller.node, &options).await?,
                    )
                })?;
            println!("{report}");
            write_json(json.as_deref(), &report)?;
            report.errors == 0
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate flow fixtures. Returns `true` if all of them are valid.
fn validate(normalizer: Normalizer<'_>, files: &[PathBuf]) -> Result<bool, Box<dyn Error>> {
    let mut all_ok = true;
    for file in files {
        let fixture = Fixture::load(file)?;
        if fixture.kind() != ResourceKind::Flow {
            println!("{}: skipping {}", fixture.name, fixture.kind());
            continue;
        }
        let validation = validate_flow(&normalizer.flat(&fixture.document.root));
        if validation.ok() {
            println!("{}: ok", fixture.name);
        } else {
            all_ok = false;
            println!("{}:", fixture.name);
            for message in validation.messages() {
                println!("  {message}");
            }
        }
    }
    Ok(all_ok)
}

/// Compare a flow fixture with a dump. Returns `true` if the flow is installed as expected.
fn compare(
    normalizer: Normalizer<'_>,
    fixture: &Path,
    dump: &Path,
    json: Option<&Path>,
) -> Result<bool, Box<dyn Error>> {
    let fixture = Fixture::load(fixture)?;
    let expected = normalizer.flat(&fixture.document.root);
    let dump = std::fs::read_to_string(dump)?;
    let flows = normalize_dump_output(&dump, &normalizer.keywords().ignore)?;

    let identity = expected.select(IDENTITY_KEYS);
    let Some(flow) = select_flow(&flows, &identity) else {
        println!("{}: no flow with {identity} in the dump", fixture.name);
        return Ok(false);
    };
    let mut report = Comparator::switch().report(&expected, flow);
    report.discrepancies.extend(check_expiry(flow, &expected));
    println!("{}: {report}", fixture.name);
    write_json(json, &report)?;
    Ok(report.is_equivalent())
}

fn write_json(path: Option<&Path>, value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    if let Some(path) = path {
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
        log::info!("Results written to {}", path.display());
    }
    Ok(())
}
