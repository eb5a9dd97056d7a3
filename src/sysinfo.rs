use anyhow::{anyhow, Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::logging::{LogCategory, LogContext};

/// Tools worth telling the model about when they are on PATH
const KNOWN_TOOLS: &[&str] = &["docker", "git", "curl", "wget", "kubectl", "helm", "terraform", "ansible"];

/// Facts about the host, sent to the model as the first conversation entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub os_name: String,
    #[serde(default)]
    pub os_version: String,
    pub arch: String,
    #[serde(default)]
    pub kernel: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub has_sudo: bool,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub shell_version: String,
    #[serde(default)]
    pub package_manager: String,
    #[serde(default)]
    pub init_system: String,
    #[serde(default)]
    pub is_container: bool,
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub available_tools: Vec<String>,
}

impl SystemInfo {
    /// Load the cached facts, collecting and caching them on first use
    pub fn detect() -> Result<Self> {
        let path = Self::cache_path()?;
        if let Ok(cached) = Self::load_from(&path) {
            return Ok(cached);
        }
        Self::collect_and_save(&path)
    }

    /// Discard the cache and collect again
    pub fn refresh() -> Result<Self> {
        let path = Self::cache_path()?;
        Self::collect_and_save(&path)
    }

    fn collect_and_save(path: &Path) -> Result<Self> {
        let info = Self::collect();
        if let Err(e) = info.save_to(path) {
            crate::log_warning!(
                LogCategory::System,
                format!("Could not cache system facts: {}", e),
                LogContext::new("sysinfo").with_operation("save_cache")
            );
        }
        Ok(info)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn cache_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .or_else(dirs::config_dir)
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join("aiassist").join("sysinfo.json"))
    }

    pub fn collect() -> Self {
        let mut info = SystemInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            user: std::env::var("USER").unwrap_or_default(),
            hostname: first_line_of("hostname", &[]).unwrap_or_default(),
            is_container: detect_container(),
            has_sudo: Command::new("sudo")
                .args(["-n", "true"])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false),
            ..Self::default()
        };

        match info.os.as_str() {
            "linux" => collect_linux(&mut info),
            "macos" => {
                info.os_name = "macOS".to_string();
                info.os_version = first_line_of("sw_vers", &["-productVersion"]).unwrap_or_default();
                info.kernel = first_line_of("uname", &["-r"]).unwrap_or_default();
                info.init_system = "launchd".to_string();
                if find_in_path("brew").is_some() {
                    info.package_manager = "brew".to_string();
                }
            }
            other => info.os_name = other.to_string(),
        }

        if let Ok(shell) = std::env::var("SHELL") {
            info.shell = shell.rsplit('/').next().unwrap_or(&shell).to_string();
            info.shell_version = first_line_of(&shell, &["--version"]).unwrap_or_default();
        }

        info.python_version = first_line_of("python3", &["--version"])
            .or_else(|| first_line_of("python", &["--version"]))
            .unwrap_or_default();

        info.available_tools = KNOWN_TOOLS
            .iter()
            .filter(|tool| find_in_path(tool).is_some())
            .map(|tool| tool.to_string())
            .collect();

        info
    }

    /// Render the facts as the system entry of the conversation
    pub fn format_as_context(&self) -> String {
        let mut lines = vec![
            "[System Environment]".to_string(),
            format!("OS: {} ({})", self.os_name, self.os),
        ];
        if !self.os_version.is_empty() {
            lines.push(format!("Version: {}", self.os_version));
        }
        lines.push(format!("Architecture: {}", self.arch));
        if !self.user.is_empty() {
            let sudo = if self.has_sudo { " (has sudo)" } else { "" };
            lines.push(format!("User: {}{}", self.user, sudo));
        }
        if !self.shell.is_empty() {
            if self.shell_version.is_empty() {
                lines.push(format!("Shell: {}", self.shell));
            } else {
                lines.push(format!("Shell: {} ({})", self.shell, self.shell_version));
            }
        }
        if !self.package_manager.is_empty() {
            lines.push(format!("Package Manager: {}", self.package_manager));
        }
        if !self.init_system.is_empty() {
            lines.push(format!("Init System: {}", self.init_system));
        }
        if !self.python_version.is_empty() {
            lines.push(format!("Python: {}", self.python_version));
        }
        if self.is_container {
            lines.push("Environment: Container".to_string());
        }
        if !self.available_tools.is_empty() {
            lines.push(format!("Available Tools: {}", self.available_tools.join(", ")));
        }
        if !self.kernel.is_empty() {
            lines.push(format!("Kernel: {}", self.kernel));
        }
        if !self.hostname.is_empty() {
            lines.push(format!("Hostname: {}", self.hostname));
        }

        let mut context = lines.join("\n");
        context.push('\n');
        context
    }

    pub fn display(&self) {
        println!("{}", "System information:".bold());
        for line in self.format_as_context().lines().skip(1) {
            if let Some((label, value)) = line.split_once(": ") {
                println!("  {}: {}", label, value.cyan());
            }
        }
    }
}

fn collect_linux(info: &mut SystemInfo) {
    if let Ok(os_release) = fs::read_to_string("/etc/os-release") {
        let release = parse_os_release(&os_release);
        info.os_name = release.name;
        info.os_version = release.version;
        info.package_manager = package_manager_for(&release.id).to_string();
    }
    if info.os_name.is_empty() {
        info.os_name = "Linux".to_string();
    }

    info.kernel = first_line_of("uname", &["-r"]).unwrap_or_default();

    info.init_system = if Path::new("/run/systemd/system").exists() {
        "systemd".to_string()
    } else if Path::new("/sbin/init").exists() {
        "sysvinit".to_string()
    } else {
        String::new()
    };
}

#[derive(Debug, Default, PartialEq)]
struct OsRelease {
    name: String,
    version: String,
    id: String,
}

fn parse_os_release(content: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim() {
            "NAME" => release.name = value,
            "VERSION" => release.version = value,
            "ID" => release.id = value,
            _ => {}
        }
    }
    release
}

fn package_manager_for(distro_id: &str) -> &'static str {
    match distro_id {
        "ubuntu" | "debian" | "linuxmint" => "apt",
        "centos" | "rhel" | "fedora" | "rocky" | "almalinux" => {
            if find_in_path("dnf").is_some() {
                "dnf"
            } else {
                "yum"
            }
        }
        "arch" | "manjaro" => "pacman",
        "alpine" => "apk",
        "opensuse" | "opensuse-leap" | "sles" => "zypper",
        _ => "",
    }
}

fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    fs::read_to_string("/proc/1/cgroup")
        .map(|cgroup| ["docker", "lxc", "kubepods"].iter().any(|m| cgroup.contains(m)))
        .unwrap_or(false)
}

fn first_line_of(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    // python2 prints its version on stderr
    let text = if output.stdout.is_empty() { output.stderr } else { output.stdout };
    String::from_utf8_lossy(&text)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SystemInfo {
        SystemInfo {
            os: "linux".to_string(),
            os_name: "Ubuntu".to_string(),
            os_version: "22.04.4 LTS (Jammy Jellyfish)".to_string(),
            arch: "x86_64".to_string(),
            kernel: "5.15.0-105-generic".to_string(),
            hostname: "web-01".to_string(),
            user: "ops".to_string(),
            has_sudo: true,
            shell: "bash".to_string(),
            package_manager: "apt".to_string(),
            init_system: "systemd".to_string(),
            available_tools: vec!["docker".to_string(), "curl".to_string()],
            ..SystemInfo::default()
        }
    }

    #[test]
    fn test_format_as_context() {
        let context = sample().format_as_context();
        assert!(context.starts_with("[System Environment]\nOS: Ubuntu (linux)\n"));
        assert!(context.contains("User: ops (has sudo)\n"));
        assert!(context.contains("Shell: bash\n"));
        assert!(context.contains("Available Tools: docker, curl\n"));
        assert!(context.ends_with("Hostname: web-01\n"));
        assert!(!context.contains("Python"));
        assert!(!context.contains("Container"));
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aiassist").join("sysinfo.json");

        sample().save_to(&path).unwrap();
        assert_eq!(SystemInfo::load_from(&path).unwrap(), sample());
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sysinfo.json");
        fs::write(&path, "not json").unwrap();
        assert!(SystemInfo::load_from(&path).is_err());
    }

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Ubuntu\"\nVERSION=\"22.04.4 LTS (Jammy Jellyfish)\"\nID=ubuntu\nID_LIKE=debian\n";
        let release = parse_os_release(content);
        assert_eq!(release.name, "Ubuntu");
        assert_eq!(release.version, "22.04.4 LTS (Jammy Jellyfish)");
        assert_eq!(release.id, "ubuntu");
    }

    #[test]
    fn test_package_manager_for_distro() {
        assert_eq!(package_manager_for("debian"), "apt");
        assert_eq!(package_manager_for("arch"), "pacman");
        assert_eq!(package_manager_for("alpine"), "apk");
        assert_eq!(package_manager_for("unknown"), "");
    }

    #[test]
    fn test_collect_reports_build_target() {
        let info = SystemInfo::collect();
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert!(!info.os_name.is_empty());
    }
}
