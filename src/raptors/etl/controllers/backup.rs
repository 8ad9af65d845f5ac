use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, instrument};

use crate::raptors::etl::config::Config;
use crate::raptors::etl::error::{EtlError, Result};
use crate::raptors::etl::query::time_string;

/// Options collected from the `backup` command.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Also archive the spreadsheets kept in the home directory.
    pub all: bool,
    /// Directory in which the temporary `dump` directory is created.
    pub out: Option<PathBuf>,
    pub database: Option<String>,
    pub collection: Option<String>,
}

/// Dumps a database (or one collection) with `mongodump` and archives the
/// result as `dump_<timestamp>.tar.gz` in the home directory.
#[derive(Debug, Clone)]
pub struct Backup {
    pub all: bool,
    pub database: String,
    pub collection: Option<String>,
    pub home_dir: PathBuf,
    pub dump_directory: PathBuf,
    pub archive_name: String,
}

impl Backup {
    pub fn new(options: BackupOptions, config: &Config) -> Self {
        let home_dir = config.paths.home_dir();
        let dump_root = options.out.unwrap_or_else(|| home_dir.clone());
        Self {
            all: options.all,
            database: config.database_or_default(options.database.as_deref()),
            collection: options.collection.filter(|name| !name.is_empty()),
            dump_directory: dump_root.join("dump"),
            archive_name: format!("dump_{}.tar.gz", time_string()),
            home_dir,
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.home_dir.join(&self.archive_name)
    }

    pub fn mongodump_args(&self) -> Vec<String> {
        let mut args = vec![
            "--out".to_string(),
            self.dump_directory.display().to_string(),
            "--db".to_string(),
            self.database.clone(),
        ];
        if let Some(collection) = &self.collection {
            args.push("--collection".to_string());
            args.push(collection.clone());
        }
        args
    }

    /// `tar` arguments archiving the dump directory and, with `all`, the
    /// given spreadsheets from the home directory.
    pub fn tar_args(&self, spreadsheets: &[String]) -> Vec<String> {
        let parent = self
            .dump_directory
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut args = vec![
            "-zcf".to_string(),
            self.archive_path().display().to_string(),
            "-C".to_string(),
            parent.display().to_string(),
            "dump".to_string(),
        ];
        if self.all && !spreadsheets.is_empty() {
            args.push("-C".to_string());
            args.push(self.home_dir.display().to_string());
            args.extend(spreadsheets.iter().cloned());
        }
        args
    }

    #[instrument(level = "info", skip_all, fields(database = %self.database))]
    pub fn execute(&self) -> Result<PathBuf> {
        info!("deleting existing dump directory");
        self.delete_dump_directory()?;

        info!("creating MongoDB dump");
        run("mongodump", &self.mongodump_args())?;

        info!("creating archive {}", self.archive_path().display());
        let spreadsheets = if self.all {
            list_spreadsheets(&self.home_dir)?
        } else {
            Vec::new()
        };
        run("tar", &self.tar_args(&spreadsheets))?;

        info!("deleting temporary dump directory");
        self.delete_dump_directory()?;
        Ok(self.archive_path())
    }

    fn delete_dump_directory(&self) -> Result<()> {
        if self.dump_directory.exists() {
            fs::remove_dir_all(&self.dump_directory)?;
        }
        Ok(())
    }
}

/// File names of the `.xlsx`/`.xls` files directly under `dir`, sorted.
fn list_spreadsheets(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sheet = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"));
        if is_sheet && path.is_file() {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn run(program: &str, args: &[String]) -> Result<()> {
    let status = Command::new(program).args(args).status()?;
    if !status.success() {
        return Err(EtlError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(home: &str) -> Config {
        let mut config = Config::default();
        config.paths.home_dir = PathBuf::from(home);
        config
    }

    #[test]
    fn explicit_database_and_collection_are_dumped() {
        let backup = Backup::new(
            BackupOptions {
                database: Some("test".to_string()),
                collection: Some("master_unique_names".to_string()),
                ..BackupOptions::default()
            },
            &config("/data/raptors"),
        );

        assert_eq!(
            backup.mongodump_args(),
            vec![
                "--out",
                "/data/raptors/dump",
                "--db",
                "test",
                "--collection",
                "master_unique_names"
            ]
        );
    }

    #[test]
    fn database_defaults_to_configured_fallback() {
        let backup = Backup::new(BackupOptions::default(), &config("/data/raptors"));

        assert_eq!(backup.database, "ccsdm");
        assert_eq!(
            backup.mongodump_args(),
            vec!["--out", "/data/raptors/dump", "--db", "ccsdm"]
        );
    }

    #[test]
    fn out_option_moves_the_dump_directory() {
        let backup = Backup::new(
            BackupOptions {
                out: Some(PathBuf::from("/tmp/backups")),
                ..BackupOptions::default()
            },
            &config("/data/raptors"),
        );

        assert_eq!(backup.dump_directory, PathBuf::from("/tmp/backups/dump"));
        let args = backup.tar_args(&[]);
        assert_eq!(args[0], "-zcf");
        assert!(args[1].starts_with("/data/raptors/dump_"));
        assert!(args[1].ends_with(".tar.gz"));
        assert_eq!(&args[2..], ["-C", "/tmp/backups", "dump"]);
    }

    #[test]
    fn all_option_archives_spreadsheets() {
        let temp_dir = tempfile::tempdir().expect("temporary directory");
        fs::write(temp_dir.path().join("plan.xlsx"), b"x").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();
        let backup = Backup::new(
            BackupOptions {
                all: true,
                ..BackupOptions::default()
            },
            &config(temp_dir.path().to_str().unwrap()),
        );

        let sheets = list_spreadsheets(temp_dir.path()).unwrap();
        assert_eq!(sheets, vec!["plan.xlsx"]);
        let args = backup.tar_args(&sheets);
        assert_eq!(args[args.len() - 1], "plan.xlsx");
    }
}
