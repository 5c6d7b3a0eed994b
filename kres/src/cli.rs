// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use kres_controller::adapter::{OutputFormat, WaitForArgs};
use kres_controller::controller::lifecycle::WaitTimeout;

#[derive(Parser, Debug)]
#[
    clap(
        name = "kres",
        version,
        author,
        about = "Manage Kubernetes objects with server-side apply"
    )
]
pub struct CliArgs {
    #[clap(long, global = true, env = "KRES_CONFIG", help = "Configuration file (.json, .yaml or .toml)")]
    pub config: Option<String>,
    #[clap(long, global = true, help = "Field manager used for server-side apply")]
    pub field_manager: Option<String>,
    #[clap(long, global = true, help = "Take ownership of fields managed by others")]
    pub force_conflicts: bool,
    #[clap(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[
        clap(
            name = "get",
            about = "Print a live object"
        )
    ]
    Get(ObjectArgs),
    #[
        clap(
            name = "apply",
            about = "Apply the objects in a manifest file and wait for them"
        )
    ]
    Apply(ApplyArgs),
    #[
        clap(
            name = "delete",
            about = "Delete an object"
        )
    ]
    Delete(DeleteArgs),
    #[
        clap(
            name = "import",
            about = "Read an object from an import token (<namespace>/<name>)"
        )
    ]
    Import(ImportArgs),
    #[
        clap(
            name = "render",
            about = "Print the documents apply would send, without contacting the cluster"
        )
    ]
    Render(RenderArgs),
    #[
        clap(
            name = "kinds",
            about = "List the built-in kinds"
        )
    ]
    Kinds,
    #[
        clap(
            name = "schema",
            about = "Print the JSON schema of declarative manager arguments"
        )
    ]
    Schema,
}

#[derive(Args, Debug)]
pub struct ObjectArgs {
    #[clap(help = "Kind name, plural, or [group/]version/Kind")]
    pub kind: String,
    pub name: String,
    #[clap(short, long)]
    pub namespace: Option<String>,
    #[clap(short, long, default_value = "yaml")]
    pub output: OutputFormat,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    #[clap(long, allow_hyphen_values = true, help = "How long each wait may take; 0 checks once, negative waits up to a week")]
    pub timeout: Option<WaitTimeout>,
    #[clap(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[clap(short, long, help = "Manifest file, or - for stdin")]
    pub filename: String,
    #[clap(long = "wait", value_name = "PATH[=VALUE]", value_parser = parse_wait, help = "Wait for a JSONPath to resolve, or to equal VALUE")]
    pub waits: Vec<WaitForArgs>,
    #[clap(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub kind: String,
    pub name: String,
    #[clap(short, long)]
    pub namespace: Option<String>,
    #[clap(long, help = "Wait until the object is gone")]
    pub wait: bool,
    #[clap(flatten)]
    pub wait_args: WaitArgs,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub kind: String,
    pub token: String,
    #[clap(short, long, default_value = "yaml")]
    pub output: OutputFormat,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[clap(short, long, help = "Manifest file, or - for stdin")]
    pub filename: String,
    #[clap(short, long, default_value = "yaml")]
    pub output: OutputFormat,
}

/// Parse `PATH` or `PATH=VALUE`. The separator is the last `=` outside
/// brackets that is not part of `==` or `!=`.
pub fn parse_wait(text: &str) -> Result<WaitForArgs, String> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut separator = None;

    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let paired = matches!(bytes.get(index + 1), Some(b'='))
                    || (index > 0 && matches!(bytes[index - 1], b'=' | b'!'));
                if !paired {
                    separator = Some(index);
                }
            },
            _ => {},
        }
    }

    let (path, value) = match separator {
        Some(index) => (&text[..index], Some(text[index + 1..].to_string())),
        None => (text, None),
    };
    if path.is_empty() {
        return Err("wait path is empty".to_string());
    }

    Ok(WaitForArgs {
        path: path.to_string(),
        value,
        timeout: None,
        poll_interval: None,
    })
}
