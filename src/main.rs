// Launcher: builds a capsule from a YAML descriptor map and reports the
// table the guest would start with. Loading and entering an actual guest
// program is the embedder's job; this binary exists to validate
// configurations and to exercise the seeding path from the command line.

use std::process::exit;

use serde::Deserialize;

use capposix::emulator::capsule::Capsule;
use capposix::emulator::dispatcher;
use capposix::interface;

#[derive(Debug, Deserialize, PartialEq)]
struct Config {
    descriptors: Vec<DescriptorEntry>,
}

/// One seeded descriptor: either a host path to open, or a host
/// descriptor number inherited from the launcher.
#[derive(Debug, Deserialize, PartialEq)]
struct DescriptorEntry {
    guest: u32,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    inherit: Option<i32>,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        interface::log_to_stderr(&format!("{}: {}\n", record.level(), record.args()));
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn seed_from_config(capsule: &Capsule, config: &Config) -> Result<(), String> {
    for entry in &config.descriptors {
        let host_fd = match (&entry.path, entry.inherit) {
            (Some(path), None) => {
                let cpath = interface::null_terminate(path.as_bytes())
                    .map_err(|e| format!("{}: {:?}", path, e))?;
                interface::openat(libc::AT_FDCWD, &cpath, libc::O_RDONLY, 0)
                    .map_err(|e| format!("{}: {:?}", path, e))?
            }
            (None, Some(host_fd)) => host_fd,
            _ => {
                return Err(format!(
                    "descriptor {}: exactly one of path or inherit required",
                    entry.guest
                ))
            }
        };
        capsule
            .seed_fd(entry.guest, host_fd)
            .map_err(|e| format!("descriptor {}: {:?}", entry.guest, e))?;
    }
    Ok(())
}

fn main() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(if std::env::var_os("CAPPOSIX_DEBUG").is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => path,
        None => {
            interface::log_to_stderr("usage: capposix <config.yaml>\n");
            exit(64);
        }
    };

    let text = match std::fs::read_to_string(&config_path) {
        Ok(text) => text,
        Err(e) => {
            interface::log_to_stderr(&format!("{}: {}\n", config_path, e));
            exit(66);
        }
    };
    let config: Config = match serde_yaml::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            interface::log_to_stderr(&format!("{}: {}\n", config_path, e));
            exit(65);
        }
    };

    let capsule = Capsule::new();
    let tid = dispatcher::capsule_enter(capsule.clone());
    if let Err(message) = seed_from_config(&capsule, &config) {
        interface::log_to_stderr(&format!("{}\n", message));
        exit(71);
    }

    let (used, size) = capsule.fdtable.usage();
    interface::log_to_stdout(&format!(
        "capsule ready: thread {} holds {} descriptors (table size {})\n",
        tid, used, size
    ));
    for entry in &config.descriptors {
        match capsule.fd_stat_get_syscall(entry.guest) {
            Ok(stat) => interface::log_to_stdout(&format!(
                "  fd {}: type {} rights base {:#x} inheriting {:#x}\n",
                entry.guest, stat.fs_filetype, stat.fs_rights_base, stat.fs_rights_inheriting
            )),
            Err(e) => interface::log_to_stdout(&format!("  fd {}: {:?}\n", entry.guest, e)),
        }
    }
}
