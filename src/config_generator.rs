//! Icinga CheckCommand configuration generated from a checker's clap
//! definition, so the command objects never drift from the actual flags.
//!
//! Every check binary calls [`print_icinga_command_config_if_env_and_exit`]
//! before parsing its arguments; setting the `GENERATE_ICINGA_COMMAND`
//! environment variable makes it print the command object and exit.

use clap::ArgAction;

pub struct CommandDescription {
    arguments: Vec<ArgumentDescription>,
}

struct ArgumentDescription {
    name: String,
    variable: String,
    description: Option<String>,
    is_flag: bool,
    default_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigGeneratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("executable path is not valid UTF-8")]
    InvalidExecutablePath,
    #[error("argument `{0}` has no long form")]
    MissingLongArgument(String),
}

impl CommandDescription {
    pub fn from_command(cmd: &clap::Command) -> Result<Self, ConfigGeneratorError> {
        let mut arguments = Vec::new();

        for arg in cmd.get_arguments() {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }

            let name = arg
                .get_long()
                .ok_or_else(|| ConfigGeneratorError::MissingLongArgument(id.to_string()))?
                .to_owned();

            arguments.push(ArgumentDescription {
                variable: name.replace('-', "_"),
                name,
                description: arg.get_help().map(|h| h.to_string()),
                is_flag: matches!(arg.get_action(), ArgAction::SetTrue | ArgAction::SetFalse),
                default_value: arg
                    .get_default_values()
                    .first()
                    .and_then(|v| v.to_str())
                    .map(|s| s.to_string()),
            });
        }

        Ok(CommandDescription { arguments })
    }

    /// Render an `object CheckCommand` block for the running executable.
    pub fn to_icinga_command(&self, name: &str) -> Result<String, ConfigGeneratorError> {
        let current_exe = std::env::current_exe()?
            .to_str()
            .ok_or(ConfigGeneratorError::InvalidExecutablePath)?
            .to_owned();

        let mut out = format!("object CheckCommand \"{name}\" {{\n");
        out.push_str(&format!("  command = [ \"{current_exe}\" ]\n"));
        out.push_str("  arguments = {\n");

        for arg in &self.arguments {
            out.push_str(&format!("    \"--{}\" = {{\n", arg.name));
            if arg.is_flag {
                out.push_str(&format!("      set_if = \"${}$\"\n", arg.variable));
            } else {
                out.push_str(&format!("      value = \"${}$\"\n", arg.variable));
            }
            if let Some(description) = &arg.description {
                out.push_str(&format!(
                    "      description = \"{}\"\n",
                    escape_string(description)
                ));
            }
            out.push_str("    }\n");
        }
        out.push_str("  }\n");

        for arg in &self.arguments {
            if let Some(default_value) = &arg.default_value {
                out.push_str(&format!(
                    "  vars.{} = \"{}\"\n",
                    arg.variable,
                    escape_string(default_value)
                ));
            }
        }

        out.push_str("}\n");
        Ok(out)
    }
}

fn escape_string(s: &str) -> String {
    s.replace('"', "\\\"").replace('$', "\\$")
}

/// Print the Icinga command configuration and exit when the
/// `GENERATE_ICINGA_COMMAND` environment variable is set.
pub fn print_icinga_command_config_if_env_and_exit(
    name: &str,
    cmd: &clap::Command,
) -> Result<(), ConfigGeneratorError> {
    if std::env::var_os("GENERATE_ICINGA_COMMAND").is_none() {
        return Ok(());
    }

    let description = CommandDescription::from_command(cmd)?;
    println!("{}", description.to_icinga_command(name)?.trim());
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        /// Hostname of the device.
        #[arg(short = 'H', long)]
        hostname: String,
        /// Use SNMP v2c.
        #[arg(short = '2', long = "v2c")]
        v2c: bool,
        /// SNMP community string.
        #[arg(short = 'C', long, default_value = "public")]
        community: String,
    }

    #[test]
    fn test_command_description() {
        use clap::CommandFactory;

        let description = CommandDescription::from_command(&Cli::command()).unwrap();
        let out = description.to_icinga_command("check_test").unwrap();

        assert!(out.starts_with("object CheckCommand \"check_test\" {"));
        assert!(out.contains("\"--hostname\""));
        assert!(out.contains("value = \"$hostname$\""));
        assert!(out.contains("set_if = \"$v2c$\""));
        assert!(out.contains("vars.community = \"public\""));
        assert!(!out.contains("--help"));
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(r#"a "b" $c"#), r#"a \"b\" \$c"#);
    }
}
