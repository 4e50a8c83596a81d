// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Opening URLs and starting applications

use std::process::{Command, Stdio};
use tracing::info;

use crate::config::AppEntry;
use crate::{RavenError, Result};

/// Starts things on the desktop
pub trait Launcher: Send + Sync {
    /// Open a URL in the default browser
    fn open_url(&self, url: &str) -> Result<()>;

    /// Start a program detached from the assistant
    fn spawn(&self, program: &str, args: &[String]) -> Result<()>;

    /// Start a catalog application by its command or URL
    fn launch(&self, app: &AppEntry) -> Result<()> {
        if let Some(url) = &app.url {
            return self.open_url(url);
        }
        let (program, args) = app
            .command
            .split_first()
            .ok_or_else(|| RavenError::Launch(format!("no command configured for {}", app.name)))?;
        self.spawn(program, args)
    }
}

/// Launcher using the platform's opener
pub struct OsLauncher;

impl Launcher for OsLauncher {
    fn open_url(&self, url: &str) -> Result<()> {
        info!("Opening URL: {}", url);

        #[cfg(target_os = "linux")]
        {
            Command::new("xdg-open")
                .arg(url)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| RavenError::Launch(format!("xdg-open: {}", e)))?;
        }
        #[cfg(target_os = "macos")]
        {
            Command::new("open")
                .arg(url)
                .spawn()
                .map_err(|e| RavenError::Launch(format!("open: {}", e)))?;
        }
        #[cfg(target_os = "windows")]
        {
            Command::new("cmd")
                .args(["/c", "start", "", url])
                .spawn()
                .map_err(|e| RavenError::Launch(format!("start: {}", e)))?;
        }
        Ok(())
    }

    fn spawn(&self, program: &str, args: &[String]) -> Result<()> {
        info!("Starting {} {:?}", program, args);
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RavenError::Launch(format!("{}: {}", program, e)))?;
        Ok(())
    }
}

/// Look up an app by canonical name
pub fn find_app<'a>(apps: &'a [AppEntry], name: &str) -> Option<&'a AppEntry> {
    apps.iter().find(|a| a.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Launcher for Recorder {
        fn open_url(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("url:{}", url));
            Ok(())
        }

        fn spawn(&self, program: &str, args: &[String]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("spawn:{} {}", program, args.join(" ")));
            Ok(())
        }
    }

    fn app(command: &[&str], url: Option<&str>) -> AppEntry {
        AppEntry {
            name: "test".to_string(),
            aliases: vec!["test".to_string()],
            command: command.iter().map(|s| s.to_string()).collect(),
            url: url.map(String::from),
            process_names: Vec::new(),
        }
    }

    #[test]
    fn test_launch_prefers_url() {
        let launcher = Recorder::default();
        launcher.launch(&app(&["ignored"], Some("https://example.com"))).unwrap();
        launcher.launch(&app(&["open", "-a", "Calculator"], None)).unwrap();
        assert_eq!(
            *launcher.calls.lock().unwrap(),
            vec!["url:https://example.com", "spawn:open -a Calculator"]
        );
    }

    #[test]
    fn test_launch_without_command_fails() {
        let launcher = Recorder::default();
        assert!(matches!(launcher.launch(&app(&[], None)), Err(RavenError::Launch(_))));
    }
}
