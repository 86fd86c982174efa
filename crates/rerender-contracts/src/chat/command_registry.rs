#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "ref",
        action: "set_reference",
    },
    CommandSpec {
        command: "reference",
        action: "set_reference",
    },
    CommandSpec {
        command: "subject",
        action: "set_subject",
    },
    CommandSpec {
        command: "user",
        action: "set_subject",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

pub(crate) const VALUE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "fidelity",
        action: "set_fidelity",
    },
    CommandSpec {
        command: "ratio",
        action: "set_ratio",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "mimic",
        action: "mimic",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "metadata",
        action: "metadata",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const EDIT_COMMAND: CommandSpec = CommandSpec {
    command: "edit",
    action: "edit",
};

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/ref PATH",
    "/subject PATH",
    "/fidelity hard|realistic",
    "/ratio auto|1:1|3:4|4:3|9:16|16:9",
    "/mimic",
    "/edit TEXT",
    "/save PATH",
    "/status",
    "/metadata",
    "/reset",
    "/help",
    "/quit",
];
