//! Names shared between the library and the CLI.

pub const APP_NAME: &str = "fatdeps";

/// Default config file looked up in the project directory.
pub const CONFIG_FILENAME: &str = "fatdeps.toml";

/// Build-number label used when the caller supplies none.
pub const DEFAULT_BUILD_NUMBER: &str = "custom";

/// Minimal PATH handed to every external tool.
pub const DEFAULT_TOOL_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin:/Library/Apple/usr/bin";

/// Host variables forwarded into child processes on top of the scoped environment.
pub const DEFAULT_PASSTHROUGH_ENV: &[&str] = &["HOME", "DEVELOPER_DIR"];

/// Inert marker written after a successful configure for adapters whose tool rewrites its own files.
pub const CONFIGURED_MARKER: &str = ".fatdeps-configured";

/// Written in the source tree once compile has succeeded.
pub const COMPILED_MARKER: &str = ".fatdeps-compiled";

/// Written in the install prefix once install has succeeded.
pub const INSTALLED_MARKER: &str = ".fatdeps-installed";

/// Suffix for staging files and directories that are renamed into place on success.
pub const PARTIAL_SUFFIX: &str = "partial";

/// Build root used when neither `--root` nor the environment names one, relative to the project dir.
pub const DEFAULT_ROOT_DIR: &str = ".fatdeps";

pub const ENV_ROOT: &str = "FATDEPS_ROOT";
pub const ENV_CONFIG: &str = "FATDEPS_CONFIG";
pub const ENV_BUILD_NUMBER: &str = "FATDEPS_BUILD_NUMBER";
