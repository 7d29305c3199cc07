use chrono::Utc;
use std::env;
use std::process;
use trending_entities::settings::settings;
use trending_entities::utils::twitter::{parse_tweet_url, TwitterClient};
use trending_entities::utils::{log_fetch_error, log_fetch_start, PostInspection};

fn print_usage() {
    eprintln!("Usage: inspect-tweet <url|id> [--self-domain <domain>]...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <url>            Post URL (https://x.com/<handle>/status/<id>)");
    eprintln!("  <id>             Numeric post id");
    eprintln!("  --self-domain    Domain whose URLs are ignored (repeatable, overrides settings)");
}

struct Args {
    input: String,
    self_domains: Vec<String>,
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut input = None;
    let mut self_domains = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--self-domain" {
            self_domains.push(iter.next()?.clone());
        } else if input.is_none() {
            input = Some(arg.clone());
        } else {
            return None;
        }
    }

    Some(Args {
        input: input?,
        self_domains,
    })
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let raw: Vec<String> = env::args().skip(1).collect();
    let Some(args) = parse_args(&raw) else {
        print_usage();
        process::exit(1);
    };
    let Some(id) = parse_tweet_url(&args.input) else {
        eprintln!("not a post url or id: {}", args.input);
        print_usage();
        process::exit(1);
    };

    let s = settings();
    let client = match TwitterClient::from_env(&s.twitter) {
        Ok(client) => client,
        Err(e) => {
            log_fetch_error(&e.to_string());
            process::exit(1);
        }
    };

    log_fetch_start(&id);
    let post = match client.lookup(&id).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            log_fetch_error("post not found");
            process::exit(1);
        }
        Err(e) => {
            log_fetch_error(&e.to_string());
            process::exit(1);
        }
    };

    let self_domains = if args.self_domains.is_empty() {
        s.twitter.self_domains.clone()
    } else {
        args.self_domains
    };

    PostInspection::inspect(&post, &s.quality, &self_domains, Utc::now()).print();
}
