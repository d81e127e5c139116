use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use sysmon::metrics::memory::MEMORY_HEADER;
use sysmon::metrics::users::USERS_HEADER;
use sysmon::metrics::{
    CpuSource, MemorySource, ProcMeminfo, ProcStat, UsersSource, UtmpFile, SEPARATOR,
};
use sysmon::{Aggregator, Config, DisplayMode, MonitorError, Pipeline, RunOutcome, VirtualScreen};
use tempfile::TempDir;

const MEMINFO: &str = "\
MemTotal:        1000000 kB
MemFree:          400000 kB
MemAvailable:     500000 kB
Buffers:           10000 kB
Cached:            50000 kB
SwapCached:            0 kB
SwapTotal:        200000 kB
SwapFree:         150000 kB
SReclaimable:       5000 kB
";

const STAT: &str = "\
cpu  100 0 50 850 0 0 0 0 0 0
cpu0 100 0 50 850 0 0 0 0 0 0
intr 0
";

struct Host {
    dir: TempDir,
}

impl Host {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        fs::write(dir.path().join("stat"), STAT).unwrap();
        fs::write(dir.path().join("utmp"), b"").unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn pipeline(&self, config: &Config) -> Pipeline {
        Pipeline::spawn(
            config,
            MemorySource::new(ProcMeminfo::at(self.path("meminfo")), config.graphics),
            UsersSource::new(UtmpFile::at(self.path("utmp"))),
            CpuSource::new(ProcStat::at(self.path("stat")), config.graphics),
        )
    }
}

fn config(args: &[&str]) -> Config {
    let argv = std::iter::once("sysmon").chain(args.iter().copied());
    let config = Config::try_parse_from(argv).unwrap();
    Config {
        period: Duration::from_millis(2),
        ..config
    }
}

async fn run(host: &Host, config: Config) -> (Result<RunOutcome, MonitorError>, VirtualScreen) {
    let pipeline = host.pipeline(&config);
    let mut aggregator = Aggregator::new(config, VirtualScreen::new(), NeverAsked);
    let result = aggregator.run(pipeline).await;
    (result, aggregator.into_display())
}

struct NeverAsked;

impl sysmon::interrupt::Prompt for NeverAsked {
    fn confirm_quit(&mut self) -> std::io::Result<bool> {
        panic!("no interrupt was sent");
    }
}

#[tokio::test]
async fn refreshing_run_with_graphs() {
    let host = Host::new();
    let (result, screen) = run(&host, config(&["--graphics", "3"])).await;
    assert_eq!(result.unwrap(), RunOutcome::Completed { rounds: 3 });

    let text = screen.text();
    assert_eq!(text[1], "Nbr of samples: 3 -- every 0 secs");
    assert_eq!(text[4], MEMORY_HEADER);
    assert_eq!(
        text[5],
        "0.55 GB / 1.02 GB  -- 0.60 GB / 1.23 GB   |o 0.00 (0.55)"
    );
    assert_eq!(text[6], text[5]);
    assert_eq!(text[7], text[5]);
    assert_eq!(&text[8..10], &[SEPARATOR, USERS_HEADER]);
    assert_eq!(text[10], SEPARATOR);
    assert!(text[11].starts_with("Number of cores: "));
    // The counters never move, so every window is idle.
    assert_eq!(text[12], "CPU usage: 0.00%");
    assert_eq!(text[13], "\t 0.00%");
    assert_eq!(text.len(), 14);
}

#[tokio::test]
async fn sequential_run_numbers_iterations() {
    let host = Host::new();
    let (result, screen) = run(&host, config(&["--sequential", "--system", "2"])).await;
    assert_eq!(result.unwrap(), RunOutcome::Completed { rounds: 2 });

    let text = screen.text();
    let iterations: Vec<_> = text.iter().filter(|l| l.starts_with(">>> iteration")).collect();
    assert_eq!(iterations, vec![&">>> iteration 1", &">>> iteration 2"]);
    assert!(!text.contains(&USERS_HEADER));
    assert_eq!(text.last(), Some(&SEPARATOR));
}

#[tokio::test]
async fn unreadable_source_aborts_before_first_round() {
    let host = Host::new();
    fs::remove_file(host.path("meminfo")).unwrap();
    let (result, screen) = run(&host, config(&["4"])).await;

    match result {
        Err(MonitorError::SourceUnavailable { source_name, .. }) => {
            assert_eq!(source_name, "memory")
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    // Only the preamble was drawn.
    assert_eq!(screen.text().last(), Some(&MEMORY_HEADER));
}

#[tokio::test]
async fn users_only_ignores_missing_system_files() {
    let host = Host::new();
    fs::remove_file(host.path("stat")).unwrap();
    fs::remove_file(host.path("meminfo")).unwrap();
    let config = config(&["--user", "2"]);
    assert_eq!(config.mode, DisplayMode::Refreshing);

    let (result, screen) = run(&host, config).await;
    assert_eq!(result.unwrap(), RunOutcome::Completed { rounds: 2 });
    assert_eq!(
        screen.text(),
        vec![SEPARATOR, "Nbr of samples: 2 -- every 0 secs", SEPARATOR, USERS_HEADER]
    );
}
