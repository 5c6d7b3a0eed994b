// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use anyhow::{bail, Context as _, Result};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;

use kres_common::telemetry::{info, warn};
use kres_controller::adapter::{args_schema, Lookup, Manager, ManagerArgs, ObjectState, OutputFormat, WaitForArgs};
use kres_controller::controller::context::Context;
use kres_controller::controller::lifecycle::{DeleteWait, WaitTimeout};
use kres_controller::identity::ResourceIdentity;
use kres_controller::kind::KindDescriptor;
use kres_controller::store::ObjectStore;

use crate::cli::{ApplyArgs, DeleteArgs, ImportArgs, ObjectArgs, RenderArgs, WaitArgs};

/// Read every document in a YAML (or JSON) manifest file. `-` reads stdin.
pub fn load_manifests(path: &str) -> Result<Vec<Value>> {
    let text = if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?
    };
    parse_manifests(&text).with_context(|| format!("failed to parse {}", path))
}

pub fn parse_manifests(text: &str) -> Result<Vec<Value>> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let manifest = Value::deserialize(document)?;
        if manifest.is_null() {
            continue;
        }
        if !manifest.is_object() {
            bail!("document {} is not an object", manifests.len() + 1);
        }
        manifests.push(manifest);
    }
    Ok(manifests)
}

fn identity(kind: &KindDescriptor, name: &str, namespace: Option<&str>, default_namespace: &str) -> ResourceIdentity {
    if kind.is_namespaced() {
        ResourceIdentity::new(namespace.unwrap_or(default_namespace), name)
    } else {
        ResourceIdentity::cluster(name)
    }
}

fn print_document(document: &Value, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(document)?,
        OutputFormat::Json => serde_json::to_string_pretty(document)? + "\n",
    };
    print!("{}", text);
    Ok(())
}

fn with_waits(waits: &[WaitForArgs], wait: &WaitArgs) -> Vec<WaitForArgs> {
    waits
        .iter()
        .cloned()
        .map(|mut args| {
            args.timeout = wait.timeout;
            args.poll_interval = wait.poll_interval;
            args
        })
        .collect()
}

fn plan_all<S>(ctx: &Context<S>, manifests: Vec<Value>, wait_for: &[WaitForArgs]) -> Result<Vec<(Manager<Arc<S>>, ManagerArgs)>>
where
    S: ObjectStore,
{
    manifests
        .into_iter()
        .map(|manifest| {
            let manager = Manager::new(ctx.controller_for(&manifest)?, ctx.state.config.provider.clone());
            let args = ManagerArgs {
                manifest,
                options: Default::default(),
                wait_for: wait_for.to_vec(),
                delete_wait: None,
            };
            Ok((manager, args))
        })
        .collect()
}

pub async fn get<S: ObjectStore>(ctx: &Context<S>, args: &ObjectArgs) -> Result<()> {
    let controller = ctx.controller_named(&args.kind)?;
    let id = identity(controller.kind(), &args.name, args.namespace.as_deref(), &ctx.state.config.provider.default_namespace);
    let state = Lookup::new(controller).read(&id).await?;
    print_document(&state.document, args.output)
}

/// Apply every document in the file concurrently. Objects that were written
/// but did not reach their wait conditions are reported and count as failed.
pub async fn apply<S: ObjectStore>(ctx: &Context<S>, args: &ApplyArgs) -> Result<()> {
    let manifests = load_manifests(&args.filename)?;
    let wait_for = with_waits(&args.waits, &args.wait);
    let planned = plan_all(ctx, manifests, &wait_for)?
        .into_iter()
        .map(|(manager, manager_args)| {
            let plan = manager.plan(&manager_args)?;
            Ok((manager, plan))
        })
        .collect::<Result<Vec<_>>>()?;

    let results = join_all(planned.iter().map(|(manager, plan)| manager.create(plan))).await;

    let mut failed = 0;
    for ((manager, plan), result) in planned.iter().zip(results) {
        let kind = manager.controller().kind();
        match result {
            Ok(state) => println!("{} {} applied", kind, state.id),
            Err(e) => {
                failed += 1;
                let (error, applied) = e.into_parts();
                match applied {
                    Some(document) => {
                        let state = ObjectState::from(&document);
                        warn!(event = "PartiallyApplied", kind = %kind, id = state.id.as_str(), error = %error);
                        println!("{} {} applied, not ready: {}", kind, state.id, error);
                    },
                    None => println!("{} {} failed: {}", kind, plan.id, error),
                }
            },
        }
    }

    if failed > 0 {
        bail!("{} of {} objects failed", failed, planned.len());
    }
    Ok(())
}

pub async fn delete<S: ObjectStore>(ctx: &Context<S>, args: &DeleteArgs) -> Result<()> {
    let provider = &ctx.state.config.provider;
    let controller = ctx.controller_named(&args.kind)?;
    let id = identity(controller.kind(), &args.name, args.namespace.as_deref(), &provider.default_namespace);

    let wait = args.wait.then(|| DeleteWait {
        timeout: args
            .wait_args
            .timeout
            .unwrap_or_else(|| WaitTimeout::from_duration(provider.default_wait_timeout)),
        poll_interval: args.wait_args.poll_interval.unwrap_or(provider.default_poll_interval),
    });

    controller.delete(&id, wait.as_ref()).await?;
    println!("{} {} deleted", controller.kind(), id);
    Ok(())
}

pub async fn import<S: ObjectStore>(ctx: &Context<S>, args: &ImportArgs) -> Result<()> {
    let manager = Manager::new(ctx.controller_named(&args.kind)?, ctx.state.config.provider.clone());
    let state = manager.import(&args.token).await?;
    info!(event = "Imported", id = state.id.as_str());
    print_document(&state.document, args.output)
}

/// Print what apply would send. Runs against the in-memory store so nothing
/// leaves the process.
pub fn render<S: ObjectStore>(ctx: &Context<S>, args: &RenderArgs) -> Result<()> {
    let manifests = load_manifests(&args.filename)?;
    for (index, (manager, manager_args)) in plan_all(ctx, manifests, &[])?.into_iter().enumerate() {
        let plan = manager.plan(&manager_args)?;
        let rendered = manager.render(&plan, args.output)?;
        match args.output {
            OutputFormat::Yaml => {
                if index > 0 {
                    println!("---");
                }
                println!("# id: {}", rendered.id);
                print!("{}", rendered.text);
            },
            OutputFormat::Json => println!("{}", rendered.text),
        }
    }
    Ok(())
}

pub fn kinds<S: ObjectStore>(ctx: &Context<S>) {
    println!("{:<58} {:<12} PLURAL", "KIND", "SCOPE");
    for kind in ctx.registry.iter() {
        println!("{:<58} {:<12} {}", kind.to_string(), format!("{:?}", kind.scope), kind.plural);
    }
}

pub fn schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&args_schema())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_document_manifests() {
        let manifests = parse_manifests(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\n---\n{\"apiVersion\": \"v1\", \"kind\": \"Secret\", \"metadata\": {\"name\": \"b\"}}\n",
        )
        .unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0]["kind"], "ConfigMap");
        assert_eq!(manifests[1]["metadata"]["name"], "b");
    }

    #[test]
    fn rejects_scalar_documents() {
        assert!(parse_manifests("just text\n").is_err());
    }
}
