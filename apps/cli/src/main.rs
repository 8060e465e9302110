use std::{io::Write as _, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    catalogue::{category_of, only_weak_matches},
    stats::{filter_stats, stat_categories},
    CompareSelection, InteractiveSearch, MarketplaceClient, SearchOutcome, StepOutcome,
};
use shared::{
    domain::{AppId, CardId, MatchResult},
    protocol::CommunityCard,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_base_url, Settings, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "marketplace", about = "Search and manage the app marketplace")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    no_match_base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find matching apps, answering follow-up questions on stdin.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Single-shot match without follow-up questions.
    Match {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    Apps {
        #[arg(long)]
        category: Option<String>,
    },
    /// Record a click on an application and print its link.
    Open {
        app_id: String,
    },
    Compare {
        company_a: String,
        company_b: String,
    },
    Community,
    Backlog {
        #[command(subcommand)]
        action: BacklogAction,
    },
    /// Report a search that found nothing useful.
    NoMatch {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Stats {
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        search: String,
    },
}

#[derive(Subcommand, Debug)]
enum BacklogAction {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
    },
    List,
    Show {
        id: String,
    },
    Upvote {
        id: String,
    },
    Toggle {
        id: String,
    },
    /// Remove a card from the backlog board.
    Discard {
        id: String,
    },
    /// Log a timestamped drop event for a card.
    Drop {
        id: String,
    },
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

    let mut settings = load_settings(&cli.config);
    if let Some(url) = cli.api_base_url {
        settings.api_base_url = url;
    }
    if let Some(url) = cli.no_match_base_url {
        settings.no_match_base_url = url;
    }
    let client = build_client(&settings)?;

    match cli.command {
        Command::Search { query } => run_search(&client, &settings, query.join(" ")).await?,
        Command::Match { prompt } => {
            let prompt = prompt.join(" ");
            let results = client
                .match_applications(&prompt, settings.finalize_limits())
                .await?;
            print_results(&SearchOutcome {
                results,
                query: prompt,
            });
        }
        Command::Apps { category } => {
            for app in client.list_applications().await? {
                let app_category = category_of(&app);
                if category.as_deref().is_some_and(|wanted| wanted != app_category) {
                    continue;
                }
                println!(
                    "{:>6}  {} [{}] {}",
                    app.id,
                    app.name,
                    app_category,
                    app.price_text.as_deref().unwrap_or("Free")
                );
            }
        }
        Command::Open { app_id } => {
            let app_id = AppId::new(app_id);
            let apps = client.list_applications().await?;
            let Some(app) = apps.into_iter().find(|app| app.id == app_id) else {
                bail!("no application with id {app_id}");
            };
            if let Err(err) = client.track_click(&app.id).await {
                warn!(app_id = %app.id, error = %err, "failed to track click");
            }
            match app.url {
                Some(url) => println!("{url}"),
                None => println!("{} has no link", app.name),
            }
        }
        Command::Compare {
            company_a,
            company_b,
        } => {
            let mut selection = CompareSelection::default();
            selection.toggle(AppId::new(company_a.clone()), company_a);
            selection.toggle(AppId::new(company_b.clone()), company_b);
            let Some((a, b)) = selection.pair() else {
                bail!("pick two different applications to compare");
            };
            let comparison = client.compare_applications(a, b).await?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
        Command::Community => {
            for card in client.community_cards().await? {
                print_card(&card);
            }
        }
        Command::Backlog { action } => match action {
            BacklogAction::List => {
                for card in client.list_cards().await? {
                    print_card(&card);
                }
            }
            BacklogAction::Show { id } => {
                let detail = client.card_detail(&CardId::new(id)).await?;
                println!("{}", serde_json::to_string_pretty(&detail)?);
            }
            BacklogAction::Upvote { id } => {
                let card = client.upvote_card(&CardId::new(id)).await?;
                println!("{} now has {} upvotes", card.title, card.upvote);
            }
            BacklogAction::Toggle { id } => {
                let card = client.toggle_card_status(&CardId::new(id)).await?;
                print_card(&card);
            }
            BacklogAction::Discard { id } => {
                let response = client.discard_card(&CardId::new(id)).await?;
                println!("{}", response.message.as_deref().unwrap_or("card discarded"));
            }
            BacklogAction::Create { title, description } => {
                let card = client.create_backlog_card(&title, &description).await?;
                println!("created backlog card_id={}", card.card_id);
            }
            BacklogAction::Drop { id } => {
                let response = client.drop_backlog_card(&CardId::new(id)).await?;
                println!("{response}");
            }
        },
        Command::NoMatch { prompt, comment } => {
            client.submit_no_match(&prompt, &comment).await?;
            println!("no-match feedback submitted");
        }
        Command::Stats { category, search } => {
            let stats = client.click_stats().await?;
            println!("categories: {}", stat_categories(&stats).join(", "));
            for stat in filter_stats(&stats, &category, &search) {
                println!(
                    "{:>6}  {} [{}]",
                    stat.click_count,
                    stat.app_name,
                    stat.tags.join(", ")
                );
            }
        }
    }

    Ok(())
}

fn build_client(settings: &Settings) -> Result<MarketplaceClient> {
    let api_base_url =
        normalize_base_url(&settings.api_base_url).context("invalid api base url")?;
    let no_match_base_url =
        normalize_base_url(&settings.no_match_base_url).context("invalid no-match base url")?;
    Ok(MarketplaceClient::new(api_base_url, no_match_base_url))
}

fn print_card(card: &CommunityCard) {
    println!(
        "{:>6}  {:<40} {:>4} upvotes {:>4} requests  {}",
        card.id,
        card.title,
        card.upvote,
        card.number_of_requests,
        if card.is_completed() { "completed" } else { "open" }
    );
}

fn print_results(outcome: &SearchOutcome) {
    println!("Results for \"{}\":", outcome.query);
    print_ranked(&outcome.results);
    if outcome.results.is_empty() || only_weak_matches(&outcome.results) {
        println!("  nothing fits well; `marketplace no-match --prompt ...` lets you report it");
    }
}

fn print_ranked(results: &[MatchResult]) {
    for (rank, result) in results.iter().enumerate() {
        println!(
            "  {:>2}. {} ({}) {:.0}%",
            rank + 1,
            result.name,
            result.app_id,
            result.similarity_percent
        );
    }
}

async fn run_search(client: &MarketplaceClient, settings: &Settings, query: String) -> Result<()> {
    let search = InteractiveSearch::new(Arc::new(client.match_service()))
        .with_finalize_limits(settings.finalize_limits())
        .with_result_handler(print_results);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut asked = false;

    let mut step = search.start(&query).await;
    loop {
        match step {
            StepOutcome::NeedsMoreInput { question } => {
                if !asked {
                    println!(
                        "(answer below; `:done` shows results now, `:reset` starts over, `:quit` aborts)"
                    );
                    asked = true;
                }
                println!("{question}");
            }
            StepOutcome::Ignored if !asked => bail!("search query is empty"),
            StepOutcome::Ignored => {}
            StepOutcome::Completed(_) | StepOutcome::Cancelled => return Ok(()),
            StepOutcome::Failed(message) => bail!("search failed: {message}"),
        }

        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            search.reset().await;
            return Ok(());
        };
        step = match SearchInput::parse(&line) {
            SearchInput::Finalize => search.finalize_search().await,
            SearchInput::Restart => {
                search.reset().await;
                search.start(&query).await
            }
            SearchInput::Quit => {
                search.reset().await;
                return Ok(());
            }
            SearchInput::Answer(answer) => search.submit_answer(answer).await,
        };
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SearchInput<'a> {
    Finalize,
    Restart,
    Quit,
    Answer(&'a str),
}

impl<'a> SearchInput<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            ":done" => Self::Finalize,
            ":reset" => Self::Restart,
            ":quit" => Self::Quit,
            answer => Self::Answer(answer),
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
