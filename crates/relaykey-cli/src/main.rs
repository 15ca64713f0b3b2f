//! CLI binary for calling LLM providers through the Portkey gateway.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use relaykey_llm::demos::{self, PromptKind};
use relaykey_llm::{
    GatewayClient, GatewayConfig, LoggingMiddleware, ModelCatalog, Provider, Response,
    UsageTrackingMiddleware, DEFAULT_ENV_FILE,
};

#[derive(Parser)]
#[command(name = "relaykey", version, about = "Multi-provider LLM calls through the Portkey gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Env file holding PORTKEY_API_KEY and PORTKEY_VIRTUAL_KEY_* values
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the example calls (defaults to google and openai plus function calling)
    Run {
        /// Providers to exercise (google, openai, anthropic, groq)
        #[arg(value_parser = parse_provider)]
        providers: Vec<Provider>,

        /// Also run the function-calling example
        #[arg(long)]
        function: bool,
    },

    /// Send a single prompt
    Complete {
        /// Prompt text
        prompt: String,

        /// Provider to route through (inferred from --model, else openai)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<Provider>,

        /// Model override (defaults to the provider's default model)
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the weather function-calling example (OpenAI)
    Function {
        /// Prompt text
        #[arg(default_value = demos::FUNCTION_PROMPT)]
        prompt: String,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask about an image
    Image {
        /// URL of the image
        url: String,

        /// Prompt to accompany the image
        prompt: String,

        /// Provider to route through (inferred from --model, else google)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<Provider>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List supported providers and their configuration status
    Providers,

    /// Read a prompt from stdin and write the JSON response to stdout
    Pipe {
        /// Provider to route through (inferred from --model, else openai)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<Provider>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    s.parse::<Provider>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `pipe` output stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let loaded = relaykey_llm::load_env_file(&cli.env_file)?;
    tracing::debug!(env_file = %cli.env_file.display(), loaded, "Environment ready");
    let config = GatewayConfig::from_env();

    match cli.command {
        Commands::Run { providers, function } => {
            let usage = UsageTrackingMiddleware::new();
            let client = build_client(config)?.with_middleware(usage.clone());
            let failures = cmd_run(&client, &providers, function).await;
            println!(
                "\nTokens used: {} in / {} out over {} calls",
                usage.total_input_tokens(),
                usage.total_output_tokens(),
                usage.calls()
            );
            if failures > 0 {
                anyhow::bail!("{failures} example group(s) failed");
            }
        }
        Commands::Complete {
            prompt,
            provider,
            model,
            max_tokens,
            json,
        } => {
            let client = build_client(config)?;
            let provider = client.resolve_provider(provider, model.as_deref(), Provider::OpenAi);
            let resp = client
                .generate_completion(&prompt, provider, model.as_deref(), max_tokens)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                print_response(&resp)?;
            }
        }
        Commands::Function { prompt, model } => {
            let client = build_client(config)?;
            cmd_function(&client, &prompt, model.as_deref()).await?;
        }
        Commands::Image {
            url,
            prompt,
            provider,
            model,
        } => {
            let client = build_client(config)?;
            let provider = client.resolve_provider(provider, model.as_deref(), Provider::Google);
            let resp = client
                .generate_image_completion(&url, &prompt, provider, model.as_deref())
                .await?;
            print_response(&resp)?;
        }
        Commands::Providers => {
            cmd_providers(&config, &cli.env_file);
        }
        Commands::Pipe { provider, model } => {
            let client = build_client(config)?;
            let provider = client.resolve_provider(provider, model.as_deref(), Provider::OpenAi);
            cmd_pipe(&client, provider, model.as_deref()).await?;
        }
    }

    Ok(())
}

fn build_client(config: GatewayConfig) -> anyhow::Result<GatewayClient> {
    Ok(GatewayClient::new(config)?.with_middleware(LoggingMiddleware))
}

/// Providers exercised when `run` is given none.
fn default_run_plan(providers: &[Provider], function: bool) -> (Vec<Provider>, bool) {
    if providers.is_empty() && !function {
        (vec![Provider::Google, Provider::OpenAi], true)
    } else {
        (providers.to_vec(), function)
    }
}

/// Runs the example groups and returns how many failed. Failures are already
/// logged by the client.
async fn cmd_run(client: &GatewayClient, providers: &[Provider], function: bool) -> usize {
    let (providers, function) = default_run_plan(providers, function);
    let mut failures = 0usize;

    for provider in &providers {
        if !client.config().has_virtual_key(*provider) {
            tracing::warn!(
                provider = %provider,
                env = provider.virtual_key_env(),
                "No virtual key configured"
            );
        }
        if run_provider_examples(client, *provider).await.is_err() {
            failures += 1;
        }
    }

    if function {
        if run_function_example(client).await.is_err() {
            failures += 1;
        }
    }

    if failures == 0 {
        println!("\nAll examples completed successfully!");
    }
    failures
}

async fn run_provider_examples(client: &GatewayClient, provider: Provider) -> anyhow::Result<()> {
    println!("\n=== Testing {} with Portkey ===", provider.as_str().to_uppercase());

    println!("\n--- Example 1: {} Basic Completion ---", provider);
    let basic_prompt = demos::prompt_for(provider, PromptKind::Basic);
    println!("Prompt: \"{}\"", basic_prompt);
    let resp = client
        .generate_completion(basic_prompt, provider, None, None)
        .await?;
    print_response(&resp)?;

    let model = provider.alternate_model();
    println!("\n--- Example 2: Using {} model ---", model);
    let creative_prompt = demos::prompt_for(provider, PromptKind::Creative);
    println!("Prompt: \"{}\"", creative_prompt);
    let resp = client
        .generate_completion(creative_prompt, provider, Some(model), Some(500))
        .await?;
    print_response(&resp)?;

    Ok(())
}

async fn run_function_example(client: &GatewayClient) -> anyhow::Result<()> {
    println!("\n=== Testing Function Calling with OpenAI ===");
    cmd_function(client, demos::FUNCTION_PROMPT, None).await
}

async fn cmd_function(
    client: &GatewayClient,
    prompt: &str,
    model: Option<&str>,
) -> anyhow::Result<()> {
    println!("Prompt: \"{}\"", prompt);
    let resp = client
        .generate_function_completion(prompt, vec![demos::weather_function()], model)
        .await?;
    print_response(&resp)
}

fn print_response(resp: &Response) -> anyhow::Result<()> {
    println!("{}", render_response(resp)?);
    Ok(())
}

fn render_response(resp: &Response) -> anyhow::Result<String> {
    if resp.has_tool_calls() {
        let calls = serde_json::to_string_pretty(&resp.tool_calls)?;
        Ok(format!("Response:\nFunction called:\n{}", calls))
    } else {
        Ok(format!(
            "Response:\n{}",
            resp.text.as_deref().unwrap_or("(empty response)")
        ))
    }
}

fn cmd_providers(config: &GatewayConfig, env_file: &Path) {
    print!("{}", render_providers(config, env_file));
}

fn render_providers(config: &GatewayConfig, env_file: &Path) -> String {
    let catalog = ModelCatalog::new();
    let mut out = format!(
        "Gateway: {}\nEnv file: {}\n\n",
        config.base_url(),
        env_file.display()
    );
    for provider in Provider::ALL {
        let status = if config.has_virtual_key(provider) {
            "configured"
        } else {
            "missing"
        };
        out.push_str(&format!(
            "{:<10} default={:<24} env={:<30} [{}]\n",
            provider.as_str(),
            provider.default_model(),
            provider.virtual_key_env(),
            status
        ));
        let models: Vec<String> = catalog
            .models_for(provider)
            .iter()
            .map(|m| format!("{} ({}k)", m.id, m.context_window / 1000))
            .collect();
        out.push_str(&format!("{:<10} models: {}\n", "", models.join(", ")));
    }
    out
}

async fn cmd_pipe(
    client: &GatewayClient,
    provider: Provider,
    model: Option<&str>,
) -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let prompt = input.trim();
    if prompt.is_empty() {
        anyhow::bail!("No prompt received on stdin");
    }

    let resp = client
        .generate_completion(prompt, provider, model, None)
        .await?;
    println!("{}", serde_json::to_string(&resp)?);
    Ok(())
}
