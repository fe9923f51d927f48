//! Interactive builder for `secretsync add`

use secretsync_common::Console;
use secretsync_data::{DataFormat, Format, Path};
use secretsync_project::{BackendConfig, SecretEntry, SyncError};
use secretsync_vault::{Mapping, VaultSecretConfig};

/// Host choice that asks for a host name instead
pub const OTHER_HOST: &str = "(other)";

const DATA_MAPPING: &str = "structured data (fromData)";
const TEXT_MAPPING: &str = "single text value (fromText)";

/// Asks for the remote side of a new entry
pub struct AddWizard<'a> {
    console: &'a dyn Console,
    known_hosts: Vec<String>,
}

impl<'a> AddWizard<'a> {
    /// `known_hosts` are offered first, usually the hosts with saved credentials
    pub fn new<I, S>(console: &'a dyn Console, known_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            console,
            known_hosts: known_hosts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn run(&self, file: &str) -> Result<SecretEntry, SyncError> {
        let class = self
            .console
            .ask("Class (leave empty to always sync this file)")?;
        let host = self.ask_host()?;
        let secret_path = self.ask_secret_path()?;
        let mapping = self.ask_mapping(file)?;

        let vault = VaultSecretConfig {
            url: format!("https://{host}/{secret_path}"),
            mapping,
        };
        vault.location()?;

        Ok(SecretEntry {
            file: file.to_string(),
            class: (!class.is_empty()).then_some(class),
            backend: BackendConfig::Vault(vault),
        })
    }

    fn ask_host(&self) -> Result<String, SyncError> {
        if !self.known_hosts.is_empty() {
            let mut options = self.known_hosts.clone();
            options.push(OTHER_HOST.to_string());

            let index = self.console.choose("Vault host", &options)?;
            if let Some(host) = self.known_hosts.get(index) {
                return Ok(host.clone());
            }
        }
        self.ask_non_empty("Vault host (e.g. vault.example.com)")
    }

    fn ask_secret_path(&self) -> Result<String, SyncError> {
        loop {
            let raw = self.ask_non_empty("Secret path, starting with the mount (e.g. secret/app/db)")?;
            let trimmed = raw.trim_matches('/');
            if trimmed.split('/').filter(|s| !s.is_empty()).count() >= 2 {
                return Ok(trimmed.to_string());
            }
            self.console
                .notice("The secret path needs both a mount and a secret name");
        }
    }

    fn ask_mapping(&self, file: &str) -> Result<Mapping, SyncError> {
        let kinds = [DATA_MAPPING.to_string(), TEXT_MAPPING.to_string()];
        let kind = self
            .console
            .choose("How does the file map to the secret?", &kinds)?;

        if kind == 1 {
            let key = self.ask_non_empty("Key of the text value (dotted, e.g. api.key)")?;
            return Ok(Mapping::FromText {
                path: Path::parse_dotted(&key),
            });
        }

        let formats = if looks_like_yaml(file) {
            [DataFormat::Yaml, DataFormat::Json]
        } else {
            [DataFormat::Json, DataFormat::Yaml]
        };
        let labels: Vec<String> = formats
            .iter()
            .map(|f| Format::from(*f).name().to_string())
            .collect();
        let index = self.console.choose("File format", &labels)?;
        let format = formats
            .get(index)
            .copied()
            .ok_or_else(|| SyncError::config("no file format selected"))?;

        let sub_path = self
            .console
            .ask("Path inside the secret (dotted, leave empty for the whole secret)")?;
        Ok(Mapping::FromData {
            format,
            path: Path::parse_dotted(&sub_path),
        })
    }

    fn ask_non_empty(&self, question: &str) -> Result<String, SyncError> {
        loop {
            let answer = self.console.ask(question)?;
            if !answer.trim().is_empty() {
                return Ok(answer.trim().to_string());
            }
            self.console.notice("A value is required");
        }
    }
}

fn looks_like_yaml(file: &str) -> bool {
    file.ends_with(".yaml") || file.ends_with(".yml")
}
