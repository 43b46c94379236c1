use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    store::versions_for_display, AnonymousAuth, AuthGateway, Plan, PlanOutcome, PromptClient,
    StaticTokenAuth,
};
use shared::{
    domain::{Prompt, PromptId, Tag, TagColor, VersionKey},
    protocol::{NewPrompt, NewVersion},
};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "promptfolio", about = "Manage versioned LLM prompts")]
struct Cli {
    /// Backend base url; overrides the settings file.
    #[arg(long, env = "PROMPTFOLIO_API_URL")]
    api_url: Option<String>,
    /// Bearer token of the signed-in user.
    #[arg(long, env = "PROMPTFOLIO_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List prompts, optionally only those carrying a tag.
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    Show {
        id: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Every tag in use, with its colour.
    Tags,
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// `name` or `name:color`; repeatable.
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,
    },
    Rename {
        id: String,
        title: String,
    },
    Delete {
        id: String,
    },
    Notes {
        id: String,
        version: String,
        notes: String,
    },
    #[command(subcommand)]
    Tag(TagCommand),
    /// Save a new version of a prompt.
    Version {
        id: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Run a prompt version (or edited text) against a model.
    Run {
        id: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        /// Edited text to run instead of the stored version.
        #[arg(long)]
        text: Option<String>,
        /// Keep the edited text as a new version when the run succeeds.
        #[arg(long, requires = "text")]
        save: bool,
    },
    #[command(subcommand)]
    Keys(KeysCommand),
    Profile,
    /// Choose a plan: free, pro_monthly or pro_yearly.
    Upgrade {
        plan: Plan,
    },
    DismissPaywall,
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    Add {
        id: String,
        name: String,
        #[arg(long, default_value = "new", value_parser = parse_color)]
        color: TagColor,
    },
    Remove {
        id: String,
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    List,
    Add { provider: String, api_key: String },
    Update { provider: String, api_key: String },
    Delete { id: i64 },
}

fn parse_color(raw: &str) -> Result<TagColor, String> {
    TagColor::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = TagColor::ALL.iter().map(|color| color.as_str()).collect();
        format!("unknown colour '{raw}' (one of {})", known.join(", "))
    })
}

fn parse_tag(raw: &str) -> Result<Tag, String> {
    match raw.split_once(':') {
        Some((name, color)) => Ok(Tag::new(name.trim(), parse_color(color)?)),
        None => Ok(Tag::new(raw.trim(), TagColor::default())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings()?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(token) = cli.token {
        settings.token = Some(token);
    }

    let auth: Arc<dyn AuthGateway> = match settings.token.as_deref() {
        Some(token) => Arc::new(StaticTokenAuth::new(token)),
        None => Arc::new(AnonymousAuth),
    };
    let client = PromptClient::new(settings.client_config(), auth)?;

    run(&client, cli.command).await
}

async fn run(client: &Arc<PromptClient>, command: Command) -> Result<()> {
    match command {
        Command::List { tag } => {
            client.load_prompts().await?;
            client.set_filter(tag.unwrap_or_default()).await;
            for prompt in client.filtered_prompts().await {
                print_summary(&prompt);
            }
        }
        Command::Show { id, version } => {
            client.load_prompts().await?;
            let prompt = find(client, &id).await?;
            print_prompt(&prompt, version.map(VersionKey::new).as_ref())?;
        }
        Command::Tags => {
            client.load_prompts().await?;
            for tag in client.available_tags().await {
                println!("{}\t{}", tag.name, tag.color);
            }
        }
        Command::Create {
            title,
            text,
            notes,
            tags,
        } => {
            client.load_prompts().await?;
            let id = client
                .create_prompt(NewPrompt {
                    title,
                    initial_version_text: text,
                    initial_version_notes: notes,
                    tags,
                })
                .await?;
            if id.is_temporary() {
                println!("created local trial prompt {id}; log in to keep it");
            } else {
                println!("created prompt {id}");
            }
        }
        Command::Rename { id, title } => {
            client.load_prompts().await?;
            if client.rename_prompt(&PromptId::new(id), &title).await? {
                println!("renamed");
            } else {
                println!("title unchanged");
            }
        }
        Command::Delete { id } => {
            client.load_prompts().await?;
            client.delete_prompt(&PromptId::new(&id)).await?;
            println!("deleted prompt {id}");
        }
        Command::Notes { id, version, notes } => {
            client.load_prompts().await?;
            client
                .save_notes(&PromptId::new(id), &VersionKey::new(version), &notes)
                .await?;
            println!("notes saved");
        }
        Command::Tag(TagCommand::Add { id, name, color }) => {
            client.load_prompts().await?;
            let tag = client.add_tag(&PromptId::new(id), &name, color).await?;
            println!("tagged with {} ({})", tag.name, tag.color);
        }
        Command::Tag(TagCommand::Remove { id, name }) => {
            client.load_prompts().await?;
            client.remove_tag(&PromptId::new(id), &name).await?;
            println!("removed tag {name}");
        }
        Command::Version {
            id,
            text,
            notes,
            provider,
            model,
        } => {
            client.load_prompts().await?;
            let key = client
                .create_version(
                    &PromptId::new(id),
                    NewVersion {
                        text,
                        notes,
                        llm_provider: provider,
                        model_id_used: model,
                    },
                )
                .await?;
            println!("saved version {key}");
        }
        Command::Run {
            id,
            version,
            provider,
            model,
            text,
            save,
        } => {
            client.load_prompts().await?;
            let prompt = find(client, &id).await?;
            let base = version
                .map(VersionKey::new)
                .unwrap_or_else(|| prompt.latest_version.clone());
            let stored = prompt
                .version(&base)
                .ok_or_else(|| anyhow!("prompt {id} has no version {base}"))?;
            let body = text.unwrap_or_else(|| stored.text.clone());
            let outcome = client
                .run_playground(&body, Some(provider.as_str()), Some(model.as_str()))
                .await;
            println!("{outcome}");
            if save && outcome.is_output() {
                let key = client
                    .save_as_new_version(
                        &prompt.id,
                        &base,
                        &body,
                        Some(provider.as_str()),
                        Some(model.as_str()),
                    )
                    .await?;
                println!("saved version {key}");
            }
        }
        Command::Keys(KeysCommand::List) => {
            for key in client.open_settings().await? {
                println!("{}\t{}\t{}", key.id, key.llm_provider, key.masked_api_key);
            }
        }
        Command::Keys(KeysCommand::Add { provider, api_key }) => {
            let record = client.add_api_key(&provider, &api_key).await?;
            println!("added {} key {}", record.llm_provider, record.masked_api_key);
        }
        Command::Keys(KeysCommand::Update { provider, api_key }) => {
            let record = client.update_api_key(&provider, &api_key).await?;
            println!("updated {} key {}", record.llm_provider, record.masked_api_key);
        }
        Command::Keys(KeysCommand::Delete { id }) => {
            client.delete_api_key(id).await?;
            println!("deleted key {id}");
        }
        Command::Profile => {
            let profile = client.load_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Upgrade { plan } => match client.choose_plan(plan).await? {
            PlanOutcome::StayedFree => println!("staying on the free plan"),
            PlanOutcome::CheckoutStarted { checkout_url } => {
                println!("continue checkout at {checkout_url}")
            }
        },
        Command::DismissPaywall => {
            client.dismiss_paywall().await?;
            println!("paywall dismissed");
        }
    }
    Ok(())
}

async fn find(client: &PromptClient, id: &str) -> Result<Prompt> {
    client
        .prompt(&PromptId::new(id))
        .await
        .ok_or_else(|| anyhow!("no prompt with id {id}"))
}

fn print_summary(prompt: &Prompt) {
    let tags: Vec<&str> = prompt.tags.iter().map(|tag| tag.name.as_str()).collect();
    println!(
        "{}\t{}\t[{}]\tlatest {}",
        prompt.id,
        prompt.title,
        tags.join(", "),
        prompt.latest_version
    );
}

fn print_prompt(prompt: &Prompt, only: Option<&VersionKey>) -> Result<()> {
    println!("{} ({})", prompt.title, prompt.id);
    for tag in &prompt.tags {
        println!("  #{} ({})", tag.name, tag.color);
    }
    let versions: Vec<_> = versions_for_display(prompt)
        .into_iter()
        .filter(|version| only.map_or(true, |key| &version.key == key))
        .collect();
    if versions.is_empty() {
        bail!("prompt {} has no such version", prompt.id);
    }
    for version in versions {
        let marker = if version.key == prompt.latest_version {
            " (latest)"
        } else {
            ""
        };
        println!("\n{} {}{}", version.key, version.date, marker);
        if let (Some(provider), Some(model)) = (&version.llm_provider, &version.model_id_used) {
            println!("tested with {provider} / {model}");
        }
        if !version.notes.is_empty() {
            println!("notes: {}", version.notes);
        }
        println!("{}", version.text);
    }
    Ok(())
}
