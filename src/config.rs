//! The config module contains the structs describing how the CI driver
//! reaches the cluster, which RAN revision it builds and on which node the
//! source workspace lives. Values come from a `ci.toml` file and can be
//! overridden on the command line.

use crate::error::CiError::ConfigNotFoundError;
use crate::error::CiResult;
use crate::{io, options};
use clap::ArgMatches;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_OC_URL: &str = "https://api.oai.cs.eurecom.fr:6443";
pub const DEFAULT_OC_REGISTRY: &str = "default-route-openshift-image-registry.apps.oai.cs.eurecom.fr";
pub const DEFAULT_RAN_NAMESPACE: &str = "oaicicd-ran";

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct CiConfig {
    pub cluster: ClusterSettings,
    pub ran: RanSettings,
    pub node: NodeSettings,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ClusterSettings {
    pub url: String,
    pub registry: String,
    /// Namespace the RAN images are pushed to and pulled from.
    pub namespace: String,
    pub user_name: String,
    pub password: String,
    pub project_name: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_OC_URL.to_string(),
            registry: DEFAULT_OC_REGISTRY.to_string(),
            namespace: DEFAULT_RAN_NAMESPACE.to_string(),
            user_name: String::new(),
            password: String::new(),
            project_name: String::new(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct RanSettings {
    pub repository: String,
    pub branch: String,
    pub commit_id: String,
    pub allow_merge: bool,
    pub target_branch: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct NodeSettings {
    /// Server the build is triggered from, `localhost` runs locally.
    pub address: String,
    pub source_code_path: String,
}

impl CiConfig {
    /// Parses the given `ci.toml` file.
    pub fn from_file(file: &Path) -> CiResult<CiConfig> {
        let contents = std::fs::read_to_string(file)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Builds the configuration for this run: the file given with `--config`
    /// (or the default one in the CI home, when present), then every
    /// command-line override on top.
    pub fn load(matches: &ArgMatches) -> CiResult<CiConfig> {
        let mut config = if let Some(file) = matches.value_of(options::args::CONFIG) {
            let file = PathBuf::from(file);
            if !file.exists() {
                return Err(ConfigNotFoundError(file.display().to_string()));
            }
            CiConfig::from_file(&file)?
        } else {
            match default_config_file() {
                Some(file) => CiConfig::from_file(&file)?,
                None => CiConfig::default(),
            }
        };
        config.apply_overrides(matches);

        Ok(config)
    }

    fn apply_overrides(&mut self, matches: &ArgMatches) {
        use crate::options::args;

        override_with(&mut self.cluster.url, matches, args::OC_URL);
        override_with(&mut self.cluster.registry, matches, args::OC_REGISTRY);
        override_with(&mut self.cluster.namespace, matches, args::OC_NAMESPACE);
        override_with(&mut self.cluster.user_name, matches, args::OC_USER_NAME);
        override_with(&mut self.cluster.password, matches, args::OC_PASSWORD);
        override_with(&mut self.cluster.project_name, matches, args::OC_PROJECT_NAME);
        override_with(&mut self.ran.repository, matches, args::RAN_REPOSITORY);
        override_with(&mut self.ran.branch, matches, args::RAN_BRANCH);
        override_with(&mut self.ran.commit_id, matches, args::RAN_COMMIT_ID);
        override_with(&mut self.ran.target_branch, matches, args::RAN_TARGET_BRANCH);
        override_with(&mut self.node.address, matches, args::NODE_ADDRESS);
        override_with(&mut self.node.source_code_path, matches, args::SOURCE_CODE_PATH);
        if matches.is_present(args::RAN_ALLOW_MERGE) {
            self.ran.allow_merge = true;
        }
    }
}

//
// PRIVATES
//

fn override_with(field: &mut String, matches: &ArgMatches, arg: &str) {
    if let Some(value) = matches.value_of(arg) {
        *field = value.to_string();
    }
}

fn default_config_file() -> Option<PathBuf> {
    io::get_ci_home()
        .map(|mut path| {
            path.push("ci.toml");
            path
        })
        .filter(|path| path.exists())
}

//
// TESTS
//

#[cfg(test)]
mod tests {
    use crate::config::{CiConfig, DEFAULT_OC_REGISTRY, DEFAULT_RAN_NAMESPACE};
    use crate::options;
    use std::io::Write;

    #[test]
    fn it_can_parse_a_partial_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cluster]
user_name = "oaicicd"
project_name = "oaicicd-ran"

[ran]
branch = "integration_2024_w10"
commit_id = "0123456789abcdef"
allow_merge = true
"#
        )
        .unwrap();

        let config = CiConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cluster.user_name, "oaicicd");
        assert_eq!(config.cluster.registry, DEFAULT_OC_REGISTRY);
        assert_eq!(config.cluster.namespace, DEFAULT_RAN_NAMESPACE);
        assert!(config.ran.allow_merge);
        assert!(config.node.address.is_empty());
    }

    #[test]
    fn it_will_override_file_values_from_the_command_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node]\naddress = \"192.168.18.197\"").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let matches = options::parse()
            .try_get_matches_from(vec![
                "ran_cluster_ci",
                "--config",
                &path,
                "--node-address",
                "localhost",
                "--ran-commit-id",
                "cafe0123",
                "--ran-allow-merge",
            ])
            .unwrap();
        let config = CiConfig::load(&matches).unwrap();

        assert_eq!(config.node.address, "localhost");
        assert_eq!(config.ran.commit_id, "cafe0123");
        assert!(config.ran.allow_merge);
    }

    #[test]
    fn it_will_fail_on_a_missing_config_file() {
        let matches = options::parse()
            .try_get_matches_from(vec!["ran_cluster_ci", "--config", "/nonexistent/ci.toml"])
            .unwrap();
        assert!(CiConfig::load(&matches).is_err());
    }
}
