use parley_core::{ProviderId, Settings};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Fail,
}

impl Status {
    fn symbol(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warn => "warn",
            Status::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub status: Status,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub checks: Vec<Check>,
}

impl HealthReport {
    /// Healthy when at least one key looks usable and storage is writable.
    pub fn healthy(&self) -> bool {
        let any_key = self
            .checks
            .iter()
            .any(|c| c.name.ends_with("API key") && c.status == Status::Ok);
        let storage_ok = self
            .checks
            .iter()
            .filter(|c| c.name == "Data directory")
            .all(|c| c.status == Status::Ok);
        any_key && storage_ok
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.checks.iter().map(|c| c.name.len()).max().unwrap_or(0);
        writeln!(f, "parley health check")?;
        writeln!(f, "{}", "─".repeat(width + 30))?;
        for check in &self.checks {
            writeln!(
                f,
                "{:<width$}  {:<4}  {}",
                check.name,
                check.status.symbol(),
                check.detail
            )?;
        }
        writeln!(f, "{}", "─".repeat(width + 30))?;
        write!(
            f,
            "{}",
            if self.healthy() {
                "All required checks passed."
            } else {
                "Some required checks failed."
            }
        )
    }
}

pub fn run(settings: &Settings) -> HealthReport {
    let mut checks: Vec<Check> = ProviderId::all()
        .into_iter()
        .map(|id| check_key(id, settings.provider(id).api_key.as_deref()))
        .collect();
    checks.push(check_data_dir(&settings.data_dir()));
    checks.push(if crate::clipboard::available() {
        Check {
            name: "Clipboard".into(),
            status: Status::Ok,
            detail: "available".into(),
        }
    } else {
        Check {
            name: "Clipboard".into(),
            status: Status::Warn,
            detail: "unavailable; /copy will not work".into(),
        }
    });
    HealthReport { checks }
}

pub fn check_key(id: ProviderId, key: Option<&str>) -> Check {
    let (status, detail) = match key.map(str::trim).filter(|k| !k.is_empty()) {
        None => (Status::Warn, format!("{} not set", id.api_key_env())),
        Some(k) if id.key_looks_valid(k) => (Status::Ok, "configured".to_string()),
        Some(_) => (Status::Fail, "set, but the format looks wrong".to_string()),
    };
    Check {
        name: format!("{} API key", id.name()),
        status,
        detail,
    }
}

/// Create the directory if needed and write then remove a probe file.
pub fn check_data_dir(dir: &Path) -> Check {
    let probe = dir.join(".parley-health");
    let result = std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&probe, b"ok"))
        .and_then(|_| std::fs::remove_file(&probe));
    let (status, detail) = match result {
        Ok(()) => (Status::Ok, format!("{} is writable", dir.display())),
        Err(e) => (Status::Fail, format!("{}: {e}", dir.display())),
    };
    Check {
        name: "Data directory".into(),
        status,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_checks() {
        assert_eq!(check_key(ProviderId::OpenAI, None).status, Status::Warn);
        assert_eq!(
            check_key(ProviderId::OpenAI, Some("sk-0123456789abcdefghij")).status,
            Status::Ok
        );
        assert_eq!(
            check_key(ProviderId::Anthropic, Some("sk-0123456789abcdefghij")).status,
            Status::Fail
        );
    }

    #[test]
    fn test_data_dir_check() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(check_data_dir(&dir.path().join("nested")).status, Status::Ok);

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(check_data_dir(&file).status, Status::Fail);
    }

    #[test]
    fn test_healthy_needs_key_and_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = HealthReport {
            checks: vec![
                check_key(ProviderId::OpenAI, Some("sk-0123456789abcdefghij")),
                check_data_dir(dir.path()),
            ],
        };
        assert!(report.healthy());

        report.checks[0] = check_key(ProviderId::OpenAI, None);
        assert!(!report.healthy());
    }
}
