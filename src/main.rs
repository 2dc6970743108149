use clap::ArgMatches;
use color_eyre::eyre::{WrapErr, eyre};
use color_eyre::{Result, Section};
use config::UserdeployConfigBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::exec::ExecContext;
use crate::registry::YunohostClient;
use crate::system::ShellIdentities;
use crate::utils::sudo::{GetRootCmd, PrivilegeManagerBuilder};

mod cli;
mod cmds;
mod config;
mod errors;
mod exec;
mod logs;
mod registry;
mod system;
mod utils;

fn main() {
    // Initialize color_eyre
    color_eyre::install().unwrap_or_else(|e| panic!("Failed to initialize color_eyre: {:?}", e));

    let cli_matches = cli::build_cli().get_matches();

    let userdeploy_config = match init_config(&cli_matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize config. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = match logs::LoggerBuilder::default()
        .with_verbosity(cli_matches.get_count("verbosity").min(2))
        .with_log_dir(&userdeploy_config.logs_dir)
        .with_max_logs(userdeploy_config.logs_max)
        .build()
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to setup logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };
    let _log_guard = match logger.start() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };

    debug!("Config initialized:\n{:#?}", &userdeploy_config);

    match run(userdeploy_config, cli_matches) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("An error occurred. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    }
}

/// Initializes and configures userdeploy by:
///
/// 1. Parsing CLI arguments
/// 2. Loading configuration from file (if present)
/// 3. Merging CLI arguments with file configuration
/// 4. Returning the final configuration
///
/// # Errors
///
/// Returns an error if configuration file parsing fails.
fn init_config(cli: &ArgMatches) -> Result<config::UserdeployConfig> {
    // Initialize config and merge CLI args into config
    let userdeploy_config = UserdeployConfigBuilder::default()
        .with_config_file(cli.get_one::<PathBuf>("config_file").cloned())
        .with_registry_cmd(cli.get_one::<String>("registry_cmd").cloned())
        .with_use_sudo(cli::flag_is_enabled(cli, "use_sudo", "no_use_sudo"))
        .with_sudo_cmd(cli.get_one::<String>("sudo_cmd").cloned())
        .with_nologin_shell(cli.get_one::<PathBuf>("nologin_shell").cloned())
        .with_logs_dir(cli.get_one::<PathBuf>("logs_dir").cloned())
        .with_logs_max(cli.get_one::<usize>("logs_max").copied())
        .build(cli.get_count("verbosity").min(2))?;

    Ok(userdeploy_config)
}

#[tokio::main]
async fn run(config: config::UserdeployConfig, arg_matches: ArgMatches) -> Result<i32> {
    // --
    // * Setup

    // Initialize privilege manager
    let pm = Arc::new(
        PrivilegeManagerBuilder::default()
            .with_use_sudo(config.use_sudo)
            .with_root_cmd(match config.sudo_cmd.as_str() {
                "sudo" => GetRootCmd::use_sudo(),
                "doas" => GetRootCmd::use_doas(),
                _ => {
                    return Err(eyre!("Unsupported privilege elevation command")
                        .suggestion("Check the value of 'sudo_cmd' in the userdeploy config"));
                }
            })
            .build()?,
    );

    // --
    // * Execute

    match cli::Commands::parse_command(&arg_matches) {
        cli::Commands::UserExists { username } => {
            let registry = YunohostClient::new(&config.registry_cmd)?;
            cmds::app_user::exists(&registry, &username).await
        }
        cli::Commands::UserInfo { username, key } => {
            let registry = YunohostClient::new(&config.registry_cmd)?;
            cmds::app_user::info(&registry, &username, &key).await
        }
        cli::Commands::UserList => {
            let registry = YunohostClient::new(&config.registry_cmd)?;
            cmds::app_user::list(&registry).await
        }
        cli::Commands::SystemUserExists { username } => {
            let identities = ShellIdentities::new(Arc::clone(&pm), config.nologin_shell.clone());
            cmds::system_user::exists(&identities, &username).await
        }
        cli::Commands::SystemGroupExists { group } => {
            let identities = ShellIdentities::new(Arc::clone(&pm), config.nologin_shell.clone());
            cmds::system_user::group_exists(&identities, &group).await
        }
        cli::Commands::SystemUserCreate {
            username,
            home_dir,
            use_shell,
        } => {
            let identities = ShellIdentities::new(Arc::clone(&pm), config.nologin_shell.clone());
            let request = system::CreateUser {
                username,
                home_dir,
                use_shell,
            };
            cmds::system_user::create(&identities, &request).await
        }
        cli::Commands::SystemUserDelete { username } => {
            let identities = ShellIdentities::new(Arc::clone(&pm), config.nologin_shell.clone());
            cmds::system_user::delete(&identities, &username).await
        }
        cli::Commands::Exec { user, command } => {
            cmds::exec::exec(&pm, &ExecContext::current(), &user, command).await
        }
        cli::Commands::Completions { shell, out } => {
            let mut cmd = cli::build_cli();
            let name = cmd.get_name().to_string();
            if let Some(out) = out {
                clap_complete::generate_to(shell, &mut cmd, name, &out).wrap_err_with(|| {
                    format!(
                        "Failed to build completions for {} and write them to {}",
                        shell,
                        out.display()
                    )
                })?;
            } else {
                clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            }
            Ok(0)
        }
    }
}
