//! Advice for commands the image doesn't ship.
//!
//! Lookup order is fixed: known alternatives, then unsupported package
//! managers, then package managers that can be added, then a generic
//! message. The first table containing the command decides, so `nix`
//! (listed as both unsupported and available) always gets the unsupported
//! message.

use std::fmt;

/// Exit status of the command-not-found handler.
pub const EXIT_NOT_FOUND: i32 = 127;

const DISTRO_NAME: &str = "KDE Linux";
const INSTALL_SOFTWARE_URL: &str =
    "https://community.kde.org/KDE_Linux/Install_software_not_available_in_Discover";

/// Replaced tools and what to use instead.
pub const KNOWN_ALTERNATIVES: &[(&str, &str)] = &[
    ("adduser", "useradd"),
    ("arp", "ip neigh"),
    ("cron", "systemctl list-timers"),
    ("dig", "resolvectl query"),
    ("egrep", "rg"),
    ("fgrep", "rg -F"),
    ("hostname", "hostnamectl"),
    ("host", "resolvectl query"),
    ("ifconfig", "ip address"),
    ("ifdown", "ip link set [interface] down"),
    ("ifup", "ip link set [interface] up"),
    ("iptunnel", "ip tunnel"),
    ("nameif", "ip link"),
    ("netstat", "ss"),
    ("nslookup", "resolvectl query"),
    ("route", "ip route"),
    ("service", "systemctl"),
    ("traceroute", "tracepath"),
    ("vi", "vim"),
];

pub const UNSUPPORTED_PACKAGE_MANAGERS: &[&str] = &[
    "apt", "apt-get", "dnf", "dpkg", "nix", "pacman", "pamac", "portage", "rpm", "yum", "zypper",
];

/// Package managers that can be installed manually, with instructions.
pub const AVAILABLE_PACKAGE_MANAGERS: &[(&str, &str)] = &[
    (
        "brew",
        "https://community.kde.org/KDE_Linux/Install_software_not_available_in_Discover#Homebrew",
    ),
    (
        "nix",
        "https://community.kde.org/KDE_Linux/Install_software_not_available_in_Discover#Nix",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advice {
    Alternative {
        command: String,
        alternative: &'static str,
    },
    UnsupportedPackageManager {
        command: String,
    },
    AvailablePackageManager {
        command: String,
        instructions: &'static str,
    },
    Unknown {
        command: String,
    },
}

pub fn advise(command: &str) -> Advice {
    let command_owned = command.to_string();

    if let Some((_, alternative)) = KNOWN_ALTERNATIVES.iter().find(|(name, _)| *name == command) {
        return Advice::Alternative {
            command: command_owned,
            alternative: *alternative,
        };
    }

    if UNSUPPORTED_PACKAGE_MANAGERS.iter().any(|name| *name == command) {
        return Advice::UnsupportedPackageManager {
            command: command_owned,
        };
    }

    if let Some((_, instructions)) = AVAILABLE_PACKAGE_MANAGERS
        .iter()
        .find(|(name, _)| *name == command)
    {
        return Advice::AvailablePackageManager {
            command: command_owned,
            instructions: *instructions,
        };
    }

    Advice::Unknown {
        command: command_owned,
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::Alternative {
                command,
                alternative,
            } => write!(
                f,
                "\n{DISTRO_NAME} does not include the “{command}” tool.\n\n\
                 Instead, try using “{alternative}”.\n"
            ),
            Advice::UnsupportedPackageManager { command } => write!(
                f,
                "\n{DISTRO_NAME} does not include the “{command}” package manager.\n\n\
                 Graphical software is available using the Discover app center. \
                 To learn how to install software that's not available in Discover, see\n\
                 {INSTALL_SOFTWARE_URL}.\n"
            ),
            Advice::AvailablePackageManager {
                command,
                instructions,
            } => write!(
                f,
                "\n{DISTRO_NAME} does not pre-install the “{command}” package manager, \
                 but it can be added manually.\n\n\
                 To do so, follow the instructions at {instructions}\n"
            ),
            Advice::Unknown { command } => write!(
                f,
                "\n{DISTRO_NAME} does not include the “{command}” command.\n\n\
                 If you know it exists, and it's important for your workflow, \
                 learn about options for getting it at\n\
                 {INSTALL_SOFTWARE_URL}#Software_not_listed_above\n"
            ),
        }
    }
}
