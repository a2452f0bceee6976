use clap::{Args, Parser, Subcommand};
use pr_splitter::forge::GITHUB_API_URL;
use pr_splitter::review::{ReviewOutcome, DEFAULT_MODEL, GEMINI_API_URL};
use pr_splitter::splitter::{self, ClassificationReport, DEFAULT_BRANCH_PREFIX, DEFAULT_COMMIT_MESSAGE};
use pr_splitter::{
    ClassifierConfig, GeminiClient, GitCli, GitHubForge, ReviewConfig, Reviewer, RevisionRange,
    SplitConfig, SplitReport, Splitter,
};
use secrecy::SecretString;
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{fmt, EnvFilter};

fn parse_ref(s: &str) -> std::result::Result<String, String> {
    if s.trim().is_empty() {
        Err("Revision cannot be empty".to_string())
    } else {
        Ok(s.trim().to_string())
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Git repository (HTTPS/SSH URL or local path)
    #[arg(global = true, short, long, default_value = ".")]
    repo: String,

    /// Log level
    #[arg(global = true, short, long, default_value = "error")]
    log: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify each changed file as a simple or structural change
    Classify(ClassifyArgs),
    /// Move the simple changes of a pull request into a new pull request
    Split(SplitArgs),
    /// Ask an LLM for a summary of each changed source file
    Review(ReviewArgs),
}

#[derive(Args)]
struct RangeArgs {
    /// Base branch of the pull request
    #[arg(short, long, env = "BASE_REF", value_parser = parse_ref)]
    base: String,

    /// Head branch of the pull request
    #[arg(long, env = "HEAD_REF", value_parser = parse_ref)]
    head: String,

    /// Remote both branches are compared on
    #[arg(long, default_value = splitter::DEFAULT_REMOTE)]
    remote: String,
}

#[derive(Args)]
struct ClassifierArgs {
    /// Maximum number of added + removed lines in a simple change
    #[arg(long, default_value_t = pr_splitter::classifier::MAX_CHANGED_LINES)]
    max_changed_lines: usize,

    /// Leading spaces on a changed line that mark an indentation change
    #[arg(long, default_value_t = pr_splitter::classifier::INDENT_WIDTH)]
    indent_width: usize,

    /// Token marking a changed line as structural (repeatable, replaces the defaults)
    #[arg(long = "structural-token")]
    structural_tokens: Vec<String>,
}

impl From<ClassifierArgs> for ClassifierConfig {
    fn from(args: ClassifierArgs) -> Self {
        let defaults = Self::default();
        Self {
            max_changed_lines: args.max_changed_lines,
            indent_width: args.indent_width,
            structural_tokens: if args.structural_tokens.is_empty() {
                defaults.structural_tokens
            } else {
                args.structural_tokens
            },
        }
    }
}

#[derive(Args)]
struct ClassifyArgs {
    #[command(flatten)]
    range: RangeArgs,

    #[command(flatten)]
    classifier: ClassifierArgs,

    /// Print the classification as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SplitArgs {
    #[command(flatten)]
    range: RangeArgs,

    #[command(flatten)]
    classifier: ClassifierArgs,

    /// Number of the pull request to split
    #[arg(short, long, env = "PR_NUMBER")]
    pr_number: u64,

    /// GitHub repository as owner/name
    #[arg(long, env = "REPO_NAME")]
    repository: String,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_URL)]
    github_api_url: String,

    /// Prefix of the generated branch name
    #[arg(long, default_value = DEFAULT_BRANCH_PREFIX)]
    branch_prefix: String,

    /// Exact name of the new branch (overrides the generated one)
    #[arg(long)]
    branch: Option<String>,

    /// Commit message for the extracted changes
    #[arg(long, default_value = DEFAULT_COMMIT_MESSAGE)]
    commit_message: String,

    /// Classify and report without creating a branch or pull request
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ReviewArgs {
    /// Base revision
    #[arg(short, long, env = "GITHUB_BASE_REF", value_parser = parse_ref)]
    base: String,

    /// Head revision
    #[arg(long, env = "GITHUB_HEAD_REF", value_parser = parse_ref)]
    head: String,

    /// File extension to review (repeatable)
    #[arg(short, long = "extension", default_values_t = vec![".py".to_string()])]
    extensions: Vec<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Gemini model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API base URL
    #[arg(long, default_value = GEMINI_API_URL)]
    gemini_api_url: String,
}

fn print_classification_summary(report: &SplitReport) {
    let mut simple = Vec::new();
    let mut structural = Vec::new();

    for classification in &report.classified {
        if classification.is_simple() {
            simple.push(classification);
        } else {
            structural.push(classification);
        }
    }

    println!("\n📊 Classification Summary:");
    println!("==========================");
    println!("Total files: {}", report.classified.len() + report.skipped.len());
    println!("  Simple:     {}", simple.len());
    println!("  Structural: {}", structural.len());
    println!("  Skipped:    {}", report.skipped.len());

    if !simple.is_empty() {
        println!("\n✨ Simple Changes:");
        for c in simple {
            println!("  {} {}", c.change.status, c.change.path);
        }
    }

    if !structural.is_empty() {
        println!("\n🔄 Structural Changes:");
        for c in structural {
            let reason = c
                .verdict
                .rejection()
                .map(ToString::to_string)
                .unwrap_or_default();
            println!("  {} {} ({reason})", c.change.status, c.change.path);
        }
    }

    if !report.skipped.is_empty() {
        println!("\n❌ Skipped Files:");
        for s in &report.skipped {
            println!("  {} {} ({})", s.change.status, s.change.path, s.error);
        }
    }
}

impl From<RangeArgs> for RevisionRange {
    fn from(args: RangeArgs) -> Self {
        Self::new(
            format!("{}/{}", args.remote, args.base),
            format!("{}/{}", args.remote, args.head),
        )
    }
}

fn classify(git: &GitCli, args: ClassifyArgs) -> pr_splitter::Result<()> {
    let range = RevisionRange::from(args.range);
    let classifier = ClassifierConfig::from(args.classifier);
    let report = splitter::classify_changes(git, &range, &classifier)?;

    if args.json {
        let rows: Vec<ClassificationReport<'_>> =
            report.classified.iter().map(Into::into).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_classification_summary(&report);
    }
    Ok(())
}

fn split(git: &GitCli, args: SplitArgs) -> pr_splitter::Result<()> {
    let config = SplitConfig {
        branch_prefix: args.branch_prefix,
        branch_name: args.branch,
        commit_message: args.commit_message,
        dry_run: args.dry_run,
        remote: args.range.remote,
        classifier: args.classifier.into(),
        ..SplitConfig::new(args.range.base, args.range.head, args.pr_number)
    };
    let forge = GitHubForge::new(
        &args.github_api_url,
        &args.repository,
        SecretString::from(args.github_token),
    )?;

    let report = Splitter::new(git, &forge, &config).run()?;
    print_classification_summary(&report);

    match &report.published {
        Some(published) => println!(
            "\n🚀 Opened #{} from branch {}: {}",
            published.pull_request.number, published.branch, published.pull_request.html_url
        ),
        None if report.simple_changes().next().is_none() => {
            println!("\nNo simple changes found, nothing to split.");
        }
        None => println!("\nDry run, no branch or pull request created."),
    }
    Ok(())
}

fn review(git: &GitCli, args: ReviewArgs) -> pr_splitter::Result<()> {
    let config = ReviewConfig {
        extensions: args.extensions,
        ..ReviewConfig::new(args.base, args.head)
    };
    println!("Comparing changes: {}", config.range);

    let client = GeminiClient::new(
        &args.gemini_api_url,
        &args.model,
        SecretString::from(args.gemini_api_key),
    );
    let reviews = Reviewer::new(git, &client, &config).review()?;

    if reviews.is_empty() {
        println!("No matching files changed. Nothing to review.");
    }
    for review in reviews {
        println!("\n📝 Review for `{}`:", review.path);
        match review.outcome {
            ReviewOutcome::Summary(summary) => println!("{summary}"),
            ReviewOutcome::Failed(error) => println!("❌ {error}"),
        }
    }
    Ok(())
}

fn main() -> pr_splitter::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive(cli.log.into());

    fmt()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .pretty()
        .init();

    let git = pr_splitter::open(&cli.repo)?;
    debug!(repo_path = %git.repo_path().display(), "Repository opened");

    match cli.command {
        Commands::Classify(args) => classify(&git, args),
        Commands::Split(args) => split(&git, args),
        Commands::Review(args) => review(&git, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn structural_tokens_replace_defaults() {
        let cli = Cli::parse_from([
            "pr-splitter",
            "classify",
            "--base",
            "main",
            "--head",
            "feature",
            "--structural-token",
            "fn ",
            "--structural-token",
            "use ",
        ]);
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        let config: ClassifierConfig = args.classifier.into();
        assert_eq!(config.structural_tokens, vec!["fn ", "use "]);
        assert_eq!(config.max_changed_lines, 20);
    }

    #[test]
    fn classify_range_is_qualified_with_remote() {
        let cli = Cli::parse_from([
            "pr-splitter",
            "classify",
            "--base",
            "main",
            "--head",
            "feature",
            "--remote",
            "upstream",
        ]);
        let Commands::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert_eq!(
            RevisionRange::from(args.range).spec(),
            "upstream/main..upstream/feature"
        );
    }
}
