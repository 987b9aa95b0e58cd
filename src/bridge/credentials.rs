//! Cloud credential resolution
//!
//! Two tiers:
//! - in CI (the configured CI variable is `true`), assume the shared cross
//!   role, then optionally chain into the step's access role using the
//!   cross role's temporary credentials
//! - anywhere else, use the local named profile and ignore the access role
//!
//! Resolution is pure; the `aws` bridge turns the result into SDK credentials.

use crate::workflow::runner_config::AwsConfig;

use super::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Profile {
        name: String,
    },
    AssumeRole {
        cross_role_arn: String,
        access_role_arn: Option<String>,
    },
}

impl CredentialSource {
    /// Resolve against the process environment
    pub fn resolve(config: &AwsConfig, access_role: Option<&str>) -> Result<Self, BridgeError> {
        Self::resolve_with(config, access_role, |name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(
        config: &AwsConfig,
        access_role: Option<&str>,
        env: F,
    ) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if env(&config.ci_env).as_deref() != Some("true") {
            return Ok(CredentialSource::Profile {
                name: config.profile.clone(),
            });
        }

        let account = required(&env, &config.account_env)?;
        let group = required(&env, &config.group_env)?;
        let cross_role = config.cross_role.replace("{group}", &group);

        let access_role_arn = access_role
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(|role| role_arn(&account, role));

        Ok(CredentialSource::AssumeRole {
            cross_role_arn: role_arn(&account, &cross_role),
            access_role_arn,
        })
    }
}

fn required<F>(env: &F, name: &str) -> Result<String, BridgeError>
where
    F: Fn(&str) -> Option<String>,
{
    env(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BridgeError::ConfigError(format!("{} must be set in CI", name)))
}

fn role_arn(account: &str, role: &str) -> String {
    if role.starts_with("arn:") {
        role.to_string()
    } else {
        format!("arn:aws:iam::{}:role/{}", account, role)
    }
}
