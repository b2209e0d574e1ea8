//! Accelerated installs
//!
//! The [`Accelerator`] ties everything together. For a project directory it
//! reads `package.json`, computes the cache key, and either unpacks a cached
//! `node_modules` or runs the installer and caches the result.

use crate::cache::{
    clear_directory, codec_for, ArchiveCodec, CacheStore, EvictionPolicy, EvictionReport,
    Fingerprint, DEFAULT_CACHE_LIMIT,
};
use crate::clock::{Clock, SystemClock};
use crate::context::{ExecutionContext, Invocation};
use crate::error::{AccelError, AccelResult};
use crate::installer::Installer;
use crate::manifest::{Manifest, PACKAGE_FILE};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the directory installers populate
pub const MODULES_DIRECTORY: &str = "node_modules";

/// Node.js interpreter names, in lookup order
const NODE_INTERPRETERS: &[&str] = &["nodejs", "node"];

/// Knobs of an [`Accelerator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelSettings {
    /// Directory holding cache archives
    pub cache_directory: PathBuf,
    /// Maximum number of archives kept after each install
    pub cache_limit: NonZeroUsize,
    /// Skip `devDependencies`
    pub production: bool,
    /// Requested installer; the default installer when unset
    pub installer: Option<Installer>,
    /// Read from the cache; follows the installer when unset
    pub read_from_cache: Option<bool>,
    /// Write to the cache; follows the installer when unset
    pub write_to_cache: Option<bool>,
}

impl AccelSettings {
    pub fn new(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            cache_limit: DEFAULT_CACHE_LIMIT,
            production: false,
            installer: None,
            read_from_cache: None,
            write_to_cache: None,
        }
    }
}

/// Interpreter and installer versions that take part in the cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Resolved path of the Node.js interpreter
    pub node_interpreter: PathBuf,
    /// Output of `node --version`
    pub node_version: String,
    /// Installer the versions were discovered for
    pub installer: Installer,
    /// Output of `<installer> --version`
    pub installer_version: String,
}

impl Toolchain {
    /// Version strings in the order they are hashed
    pub fn versions(&self) -> [&str; 2] {
        [&self.node_version, &self.installer_version]
    }
}

/// What [`Accelerator::install`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// `package.json` lists no dependencies
    NothingToDo,
    /// `node_modules` was unpacked from the cache
    FromCache {
        fingerprint: Fingerprint,
        dependencies: usize,
    },
    /// The installer ran
    Installed {
        installer: Installer,
        fingerprint: Fingerprint,
        dependencies: usize,
        /// Whether the result was added to the cache
        cached: bool,
    },
}

/// Installs project dependencies, using the cache where possible
pub struct Accelerator {
    context: Arc<dyn ExecutionContext>,
    store: CacheStore,
    settings: AccelSettings,
    installer: Option<Installer>,
    toolchain: Option<Toolchain>,
}

impl Accelerator {
    pub fn new(
        context: Arc<dyn ExecutionContext>,
        codec: Arc<dyn ArchiveCodec>,
        clock: Arc<dyn Clock>,
        settings: AccelSettings,
    ) -> Self {
        let store = CacheStore::new(
            settings.cache_directory.clone(),
            context.clone(),
            codec,
            clock,
        );
        Self {
            context,
            store,
            settings,
            installer: None,
            toolchain: None,
        }
    }

    /// Accelerator with the codec suited to `context` and the system clock
    pub fn with_context(context: Arc<dyn ExecutionContext>, settings: AccelSettings) -> Self {
        let codec: Arc<dyn ArchiveCodec> = Arc::from(codec_for(&*context));
        Self::new(context, codec, Arc::new(SystemClock), settings)
    }

    pub fn settings(&self) -> &AccelSettings {
        &self.settings
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Request a different installer
    ///
    /// Forgets the resolved installer and the discovered toolchain; both
    /// are looked up again on next use.
    pub fn set_installer(&mut self, installer: Installer) {
        self.settings.installer = Some(installer);
        self.installer = None;
        self.toolchain = None;
    }

    /// `yarn` when it is installed, `npm` otherwise
    pub async fn default_installer(&self) -> AccelResult<Installer> {
        if self.context.find_program(Installer::Yarn.program()).await?.is_some() {
            debug!("Selecting 'yarn' as default installer");
            Ok(Installer::Yarn)
        } else {
            debug!("Selecting 'npm' as default installer ('yarn' isn't installed)");
            Ok(Installer::Npm)
        }
    }

    /// The installer that will run, resolved once per request
    pub async fn installer(&mut self) -> AccelResult<Installer> {
        if let Some(installer) = self.installer {
            return Ok(installer);
        }
        let installer = self.select_installer().await?;
        self.installer = Some(installer);
        Ok(installer)
    }

    async fn select_installer(&self) -> AccelResult<Installer> {
        let Some(requested) = self.settings.installer else {
            return self.default_installer().await;
        };
        if self.context.find_program(requested.program()).await?.is_some() {
            debug!("Selecting user defined installer '{}' (confirmed to be installed)", requested);
            return Ok(requested);
        }
        let fallback = self.default_installer().await?;
        warn!(
            "User defined installer '{}' isn't available, falling back to {}",
            requested, fallback
        );
        Ok(fallback)
    }

    /// Whether cached archives may be unpacked
    pub async fn read_from_cache(&mut self) -> AccelResult<bool> {
        match self.settings.read_from_cache {
            Some(read) => Ok(read),
            None => Ok(self.installer().await?.uses_accel_cache()),
        }
    }

    /// Whether fresh installs are added to the cache
    pub async fn write_to_cache(&mut self) -> AccelResult<bool> {
        match self.settings.write_to_cache {
            Some(write) => Ok(write),
            None => Ok(self.installer().await?.uses_accel_cache()),
        }
    }

    /// Node.js and installer versions, discovered on first use
    pub async fn toolchain(&mut self) -> AccelResult<&Toolchain> {
        let toolchain = match self.toolchain.take() {
            Some(toolchain) => toolchain,
            None => self.discover_toolchain().await?,
        };
        let toolchain: &Toolchain = self.toolchain.insert(toolchain);
        Ok(toolchain)
    }

    async fn discover_toolchain(&mut self) -> AccelResult<Toolchain> {
        let installer = self.installer().await?;
        let node_interpreter = self.node_interpreter().await?;
        let node_version = self
            .context
            .capture(&Invocation::new(node_interpreter.display().to_string()).arg("--version"))
            .await?;
        let installer_version = self.context.capture(&installer.version_invocation()).await?;
        debug!(
            node = %node_version,
            %installer,
            installer_version = %installer_version,
            "Discovered toolchain"
        );
        Ok(Toolchain {
            node_interpreter,
            node_version,
            installer,
            installer_version,
        })
    }

    async fn node_interpreter(&self) -> AccelResult<PathBuf> {
        for name in NODE_INTERPRETERS {
            if let Some(path) = self.context.find_program(name).await? {
                return Ok(path);
            }
        }
        Err(AccelError::MissingNodeInterpreter)
    }

    /// Cache key for the given dependencies and the current toolchain
    pub async fn fingerprint<'d, I>(&mut self, dependencies: I) -> AccelResult<Fingerprint>
    where
        I: IntoIterator<Item = (&'d String, &'d String)>,
    {
        let toolchain = self.toolchain().await?;
        Ok(Fingerprint::compute(dependencies, &toolchain.versions()))
    }

    /// Install the dependencies of the project in `directory`
    pub async fn install(&mut self, directory: &Path) -> AccelResult<InstallOutcome> {
        let started = Instant::now();
        let package_file = directory.join(PACKAGE_FILE);
        let modules_directory = directory.join(MODULES_DIRECTORY);

        let manifest = Manifest::load(&*self.context, &package_file).await?;
        let dependencies = manifest.dependencies(self.settings.production);
        info!("Installing Node.js packages in {}", directory.display());
        if dependencies.is_empty() {
            info!("Nothing to do! (no dependencies to install)");
            return Ok(InstallOutcome::NothingToDo);
        }

        let installer = self.installer().await?;
        let fingerprint = self.fingerprint(&dependencies).await?;
        let read = self.read_from_cache().await?;
        let write = self.write_to_cache().await?;

        if read && self.install_from_cache(&fingerprint, &modules_directory).await? {
            info!(
                "Done! Took {:.2?} to install {} dependencies from cache",
                started.elapsed(),
                dependencies.len()
            );
            self.evict().await;
            return Ok(InstallOutcome::FromCache {
                fingerprint,
                dependencies: dependencies.len(),
            });
        }

        clear_directory(&*self.context, &modules_directory).await?;
        self.run_installer(installer, directory, &package_file).await?;

        let cached = write && self.add_to_cache(&fingerprint, &modules_directory).await;
        info!(
            "Done! Took {:.2?} to install {} dependencies using {}",
            started.elapsed(),
            dependencies.len(),
            installer
        );

        if read || write {
            self.evict().await;
        }
        Ok(InstallOutcome::Installed {
            installer,
            fingerprint,
            dependencies: dependencies.len(),
            cached,
        })
    }

    /// Unpack a cached archive; `false` means a full install is needed
    async fn install_from_cache(
        &self,
        fingerprint: &Fingerprint,
        modules_directory: &Path,
    ) -> AccelResult<bool> {
        debug!("Checking the cache ({})", self.store.archive_path(fingerprint).display());
        match self.store.retrieve(fingerprint, modules_directory).await {
            Ok(()) => Ok(true),
            Err(e @ AccelError::NotFound { .. }) => {
                debug!("{}", e);
                Ok(false)
            }
            Err(e) if e.is_cache_miss() => {
                warn!("{}; falling back to a full install", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the installer, restoring the exact bytes of `package.json`
    /// afterwards whether or not it succeeded
    async fn run_installer(
        &self,
        installer: Installer,
        directory: &Path,
        package_file: &Path,
    ) -> AccelResult<()> {
        let original = self.context.read_file(package_file).await?;

        let invocation = installer.install_invocation(directory, self.settings.production);
        info!("Running command: {}", invocation);
        let result = match self.context.execute(&invocation).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(AccelError::InstallerFailed {
                installer: installer.to_string(),
                code: output.code.unwrap_or(-1),
            }),
            Err(e) => Err(e),
        };

        let restored = self.context.write_file(package_file, &original).await;
        match (result, restored) {
            (Ok(()), restored) => restored,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore)) => {
                warn!("Failed to restore {}: {}", package_file.display(), restore);
                Err(e)
            }
        }
    }

    async fn add_to_cache(&self, fingerprint: &Fingerprint, modules_directory: &Path) -> bool {
        match self.store.store(fingerprint, modules_directory).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}; node_modules is installed but was not cached", e);
                false
            }
        }
    }

    /// Trim the cache to the configured limit, logging instead of failing
    pub async fn evict(&self) -> Option<EvictionReport> {
        match EvictionPolicy::new(&self.store)
            .enforce(self.settings.cache_limit)
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Failed to clean the cache: {}", e);
                None
            }
        }
    }
}
