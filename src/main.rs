mod error;
mod models;
mod report;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::debug;
use os_api::{CpuInfoReader, HostRoot};
use topology::{Bitset, MachineCpuSet};

use crate::error::ReportError;
use crate::models::{AffinityReport, TopologyReport};

#[derive(Parser, Debug)]
#[command(name = "cpuinfo", version, about = "Inspect host CPU topology and translate CPU sets")]
struct Cli {
    /// Directory holding the host's proc and sys trees [default: $HOST_ROOT or /]
    #[arg(long, global = true)]
    host_root: Option<PathBuf>,

    /// Leave out efficiency cores listed under sys/devices/cpu_atom
    #[arg(long, global = true)]
    no_ecores: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print CPU model, per-CPU info and the abstract CPU map (default)
    Report {
        /// Also list PCIe devices
        #[arg(long)]
        pcie: bool,
    },
    /// Translate an abstract CPU bitset ("0x..") to machine CPUs
    ToMachine { bitset: Bitset },
    /// Translate a machine CPU list ("0-3,8") to an abstract bitset
    ToAbstract { cpus: MachineCpuSet },
    /// Print the bitset selecting every abstract CPU
    Ones,
    /// Show the CPUs a process may run on
    Affinity {
        /// Process id, defaults to this process
        pid: Option<u32>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    debug!("{cli:?}");

    if let Err(err) = run(cli) {
        eprintln!("failed to execute command: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ReportError> {
    let host = cli
        .host_root
        .map(HostRoot::new)
        .unwrap_or_else(HostRoot::from_env);
    debug!("reading host topology under {}", host.path().display());
    let mut reader = CpuInfoReader::new(host.clone());
    if cli.no_ecores {
        reader = reader.without_ecores();
    }

    let output = match cli.command.unwrap_or(Command::Report { pcie: false }) {
        Command::Report { pcie } => {
            let report = TopologyReport::collect(&reader, pcie.then_some(&host))?;
            report.render()?
        }
        Command::ToMachine { bitset } => {
            let map = report::load_map(&reader)?;
            format!("{}\n", map.to_machine(&bitset)?)
        }
        Command::ToAbstract { cpus } => {
            let map = report::load_map(&reader)?;
            format!("{}\n", map.to_abstract(&cpus)?)
        }
        Command::Ones => {
            let map = report::load_map(&reader)?;
            format!("{}\n", map.ones_bitset())
        }
        Command::Affinity { pid } => {
            let map = report::load_map(&reader)?;
            let affinity = AffinityReport::collect(&map, pid)?;
            format!("{}\n", serde_json::to_string_pretty(&affinity)?)
        }
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli =
            Cli::try_parse_from(["cpuinfo", "--host-root", "/tmp/host", "to-machine", "0x3"])
                .unwrap();
        assert_eq!(cli.host_root, Some(PathBuf::from("/tmp/host")));
        match cli.command {
            Some(Command::ToMachine { bitset }) => assert_eq!(bitset.to_hex(), "0x3"),
            other => panic!("unexpected command {other:?}"),
        }

        let cli =
            Cli::try_parse_from(["cpuinfo", "to-abstract", "0-1,4", "--no-ecores"]).unwrap();
        assert!(cli.no_ecores);
        assert_eq!(cli.host_root, None);
        match cli.command {
            Some(Command::ToAbstract { cpus }) => assert_eq!(cpus.list(), vec![0, 1, 4]),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["cpuinfo", "report", "--pcie"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Report { pcie: true })));
    }

    #[test]
    fn test_reject_bad_arguments() {
        // a bare "ff" is valid hex, these are not
        assert!(Cli::try_parse_from(["cpuinfo", "to-machine", "ff"]).is_ok());
        assert!(Cli::try_parse_from(["cpuinfo", "to-machine", "bad data"]).is_err());
        assert!(Cli::try_parse_from(["cpuinfo", "to-machine", "0xzz"]).is_err());
        assert!(Cli::try_parse_from(["cpuinfo", "to-abstract", "3-1"]).is_err());
        assert!(Cli::try_parse_from(["cpuinfo", "affinity", "self"]).is_err());
    }
}
