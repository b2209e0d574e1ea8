//! Supported Node.js package installers

use crate::context::Invocation;
use crate::error::AccelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A program that can populate `node_modules` from `package.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Installer {
    /// `npm install`
    Npm,
    /// `yarn`
    Yarn,
    /// `pnpm install`
    Pnpm,
    /// `npm-cache install npm`, which keeps a cache of its own
    NpmCache,
}

impl Installer {
    /// All installers, in the order they are listed to users
    pub fn all() -> &'static [Self] {
        &[Self::Npm, Self::Yarn, Self::Pnpm, Self::NpmCache]
    }

    /// Name used on the command line and in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::NpmCache => "npm-cache",
        }
    }

    /// Executable that has to be on the search path
    pub fn program(&self) -> &'static str {
        self.name()
    }

    /// Whether the npm-accel cache should be used by default
    ///
    /// npm-cache manages its own cache, so layering a second one on top
    /// only costs disk space.
    pub fn uses_accel_cache(&self) -> bool {
        !matches!(self, Self::NpmCache)
    }

    /// `--production=true|false`, understood by every supported installer
    pub fn production_option(production: bool) -> String {
        format!("--production={}", production)
    }

    /// Command that installs the dependencies of the project in `directory`
    pub fn install_invocation(&self, directory: &Path, production: bool) -> Invocation {
        let subcommand: &[&str] = match self {
            Self::Npm | Self::Pnpm => &["install"],
            Self::Yarn => &[],
            Self::NpmCache => &["install", "npm"],
        };
        Invocation::new(self.program())
            .args(subcommand.iter().copied())
            .arg(Self::production_option(production))
            .current_dir(directory)
            .inherit_output()
    }

    /// Command that prints the installer version
    pub fn version_invocation(&self) -> Invocation {
        Invocation::new(self.program()).arg("--version")
    }

    fn supported_names() -> String {
        Self::all()
            .iter()
            .map(Self::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Installer {
    type Err = AccelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|installer| installer.name() == s)
            .ok_or_else(|| AccelError::UnknownInstaller {
                name: s.to_string(),
                supported: Self::supported_names(),
            })
    }
}
