//! This module defines the command-line interface (CLI) structure using clap's builder pattern

use clap::builder::{FalseyValueParser, TypedValueParser};
use clap::{
    Arg, ArgAction, ArgMatches, Command, crate_name, crate_version, value_parser,
};
use clap_complete::Shell;
use std::env;
use std::{ffi::OsString, path::PathBuf};

// -------------------------------------------------------------------------------------------------
// CLI builder
// -------------------------------------------------------------------------------------------------

/// Constructs the CLI application definition using clap's builder pattern
///
/// Defines all commands, arguments, and help documentation.
pub(crate) fn build_cli() -> Command {
    let cmd = Command::new(crate_name!())
        .version(crate_version!())
        .about("Userdeploy - Application and system user management for app deployments")
        .subcommand_required(true)
        // --
        // * Main and global options
        .arg(
            Arg::new("config_file")
                .long("config-file")
                .env("UD_CONFIG_FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("registry_cmd")
                .long("registry-cmd")
                .env("UD_REGISTRY_CMD")
                .value_parser(value_parser!(String))
                .help("Account management CLI holding the application user registry"),
        )
        .arg(
            Arg::new("use_sudo")
                .long("use-sudo")
                .env("UD_USE_SUDO")
                .value_parser(FalseyValueParser::new().map(|b| -> u8 {
                    if b { 1 } else { 0 }
                }))
                .action(ArgAction::Count)
                .help("Allow privilege elevation [default]"),
        )
        .arg(
            Arg::new("no_use_sudo")
                .long("no-use-sudo")
                .value_parser(FalseyValueParser::new().map(|b| -> u8 {
                    if b { 1 } else { 0 }
                }))
                .action(ArgAction::Count)
                .help("Don't allow privilege elevation"),
        )
        .arg(
            Arg::new("sudo_cmd")
                .long("sudo-cmd")
                .env("UD_SUDO_CMD")
                .value_parser(value_parser!(String))
                .help("Command used for privilege elevation (sudo/doas)"),
        )
        .arg(
            Arg::new("nologin_shell")
                .long("nologin-shell")
                .env("UD_NOLOGIN_SHELL")
                .value_parser(value_parser!(PathBuf))
                .help("Shell assigned to accounts that must not be able to log in"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .global(true)
                .env("UD_VERBOSE")
                .action(ArgAction::Count)
                .help("Verbosity level (-v = debug, -vv = trace)"),
        )
        .arg(
            Arg::new("logs_dir")
                .long("logs-dir")
                .env("UD_LOGS_DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("logs_max")
                .long("logs-max")
                .env("UD_LOGS_MAX")
                .value_parser(value_parser!(usize)),
        );

    // --
    // * Add subcommands

    // --
    // * application users

    cmd.subcommand(
        Command::new("user-exists")
            .about("Check whether an application user is registered")
            .arg(
                Arg::new("username")
                    .value_name("USERNAME")
                    .required(true)
                    .value_parser(value_parser!(String))
                    .help("Name of the application user"),
            ),
    )
    .subcommand(
        Command::new("user-info")
            .about("Print one field of an application user's profile")
            .arg(
                Arg::new("username")
                    .value_name("USERNAME")
                    .required(true)
                    .value_parser(value_parser!(String))
                    .help("Name of the application user"),
            )
            .arg(
                Arg::new("key")
                    .value_name("KEY")
                    .required(true)
                    .value_parser(value_parser!(String))
                    .help("Profile field to print (e.g. mail)"),
            ),
    )
    .subcommand(
        Command::new("user-list").about("List all registered application usernames"),
    )
    // --
    // * system users and groups
    .subcommand(
        Command::new("system-user-exists")
            .about("Check whether an OS-level user exists")
            .arg(
                Arg::new("username")
                    .value_name("USERNAME")
                    .required(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    .subcommand(
        Command::new("system-group-exists")
            .about("Check whether an OS-level group exists")
            .arg(
                Arg::new("group")
                    .value_name("GROUP")
                    .required(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    .subcommand(
        Command::new("system-user-create")
            .about("Create an OS-level system user (no-op if it already exists)")
            .arg(
                Arg::new("username")
                    .value_name("USERNAME")
                    .required(true)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                Arg::new("home_dir")
                    .long("home-dir")
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .help("Home directory for the user; omitted means no home directory at all"),
            )
            .arg(
                Arg::new("use_shell")
                    .long("use-shell")
                    .action(ArgAction::SetTrue)
                    .help("Keep the OS default login shell instead of forcing a non-login shell"),
            ),
    )
    .subcommand(
        Command::new("system-user-delete")
            .about("Delete an OS-level user and its same-named group (warns if absent)")
            .arg(
                Arg::new("username")
                    .value_name("USERNAME")
                    .required(true)
                    .value_parser(value_parser!(String)),
            ),
    )
    // --
    // * exec
    .subcommand(
        Command::new("exec")
            .about("Run a command as another OS user")
            .arg(
                Arg::new("user")
                    .value_name("USER")
                    .required(true)
                    .value_parser(value_parser!(String))
                    .help("Target OS user"),
            )
            .arg(
                Arg::new("command")
                    .value_name("COMMAND")
                    .required(true)
                    .num_args(1..)
                    .value_parser(value_parser!(OsString))
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true)
                    .help("Command and its arguments"),
            ),
    )
    // --
    // * completions
    .subcommand(
        Command::new("completions")
            .about("Generate shell completions")
            .arg(
                Arg::new("shell")
                    .required(true)
                    .long("shell")
                    .short('s')
                    .value_parser(value_parser!(Shell))
                    .help("Set the shell for generating completions [values: bash, elvish, fish, powerShell, zsh]"),
            )
            .arg(
                Arg::new("out")
                    .long("out")
                    .value_parser(value_parser!(PathBuf))
                    .help("Set the out directory for writing completions file"),
            ),
    )
}

// -------------------------------------------------------------------------------------------------
// CLI Commands
// -------------------------------------------------------------------------------------------------

/// Represents parsed command-line subcommands and their arguments
///
/// Contains variants for each supported operation with their respective options. Produced by
/// parsing raw CLI arguments using clap's ArgMatches structure.
#[derive(Debug)]
pub(crate) enum Commands {
    UserExists {
        username: String,
    },
    UserInfo {
        username: String,
        key: String,
    },
    UserList,
    SystemUserExists {
        username: String,
    },
    SystemGroupExists {
        group: String,
    },
    SystemUserCreate {
        username: String,
        home_dir: Option<PathBuf>,
        use_shell: bool,
    },
    SystemUserDelete {
        username: String,
    },
    Exec {
        user: String,
        command: Vec<OsString>,
    },
    Completions {
        shell: Shell,
        out: Option<PathBuf>,
    },
}

impl Commands {
    /// Converts raw CLI matches into structured Commands enum
    ///
    /// Acts as bridge between clap's ArgMatches structure and application logic.
    pub(crate) fn parse_command(matches: &clap::ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("user-exists", sub_matches)) => Commands::UserExists {
                username: sub_matches.get_one::<String>("username").unwrap().clone(),
            },
            Some(("user-info", sub_matches)) => Commands::UserInfo {
                username: sub_matches.get_one::<String>("username").unwrap().clone(),
                key: sub_matches.get_one::<String>("key").unwrap().clone(),
            },
            Some(("user-list", _)) => Commands::UserList,
            Some(("system-user-exists", sub_matches)) => Commands::SystemUserExists {
                username: sub_matches.get_one::<String>("username").unwrap().clone(),
            },
            Some(("system-group-exists", sub_matches)) => Commands::SystemGroupExists {
                group: sub_matches.get_one::<String>("group").unwrap().clone(),
            },
            Some(("system-user-create", sub_matches)) => Commands::SystemUserCreate {
                username: sub_matches.get_one::<String>("username").unwrap().clone(),
                home_dir: sub_matches.get_one::<PathBuf>("home_dir").cloned(),
                use_shell: sub_matches.get_flag("use_shell"),
            },
            Some(("system-user-delete", sub_matches)) => Commands::SystemUserDelete {
                username: sub_matches.get_one::<String>("username").unwrap().clone(),
            },
            Some(("exec", sub_matches)) => Commands::Exec {
                user: sub_matches.get_one::<String>("user").unwrap().clone(),
                command: sub_matches
                    .get_many::<OsString>("command")
                    .map(|v| v.cloned().collect())
                    .unwrap_or_default(),
            },
            Some(("completions", completions_matches)) => Commands::Completions {
                shell: *completions_matches.get_one::<Shell>("shell").unwrap(),
                out: completions_matches.get_one::<PathBuf>("out").cloned(),
            },
            // Default case, should never happen with clap validation
            _ => unreachable!(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Flag parser
// -------------------------------------------------------------------------------------------------

/// Determines effective state of conflicting boolean flags with environment fallback
///
/// Resolves precedence between mutually exclusive flags (e.g. --use-sudo vs --no-use-sudo) by
/// considering:
///
/// * Last specified flag on command line
/// * Environment variable default
/// * Returns None if no relevant options were specified
pub(crate) fn flag_is_enabled(matches: &ArgMatches, on_flag: &str, off_flag: &str) -> Option<bool> {
    // Determine the name the raw flags, following the "FLAG"/"no-FLAG" pattern
    let raw_on_flag = ["--", &on_flag.replace("_", "-")].join("");
    let raw_off_flag = ["--", &off_flag.replace("_", "-")].join("");

    // Get raw arguments to determine the order
    let raw_args: Vec<String> = env::args().collect();

    // Find the last occurrence of either --FLAG or --no-FLAG
    let mut last_on_position = -1;
    let mut last_off_position = -1;

    for (index, arg) in raw_args.iter().enumerate() {
        if arg == raw_on_flag.as_str() {
            last_on_position = index as i32;
        } else if arg == raw_off_flag.as_str() {
            last_off_position = index as i32;
        }
    }

    if last_on_position > last_off_position {
        Some(true)
    } else if last_off_position > last_on_position {
        Some(false)
    } else {
        // Neither was specified on command line, check environment variable
        let var = matches.get_count(on_flag) > 0;
        if var { Some(var) } else { None }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
