use std::time::{Duration, Instant};
use rand::{seq::SliceRandom, thread_rng};
use reqwest::Client;
use hdrhistogram::Histogram;


const INPUTS: &[&str] = &[
    "Tell me about yourself.",
    "What is your biggest weakness?",
    "Describe a project you are proud of.",
    "How do you handle conflict in a team?",
    "Why do you want this job?",
    "Walk me through a hard bug you fixed.",
    "Where do you see yourself in five years?",
    "Explain ownership in Rust.",
];


#[derive(Clone, Copy, Debug)]
enum Mode {
    Chat,
    Generate,
}

impl Mode {
    fn parse(arg: Option<String>, url: &str) -> anyhow::Result<Self> {
        match arg.as_deref() {
            Some("chat") => Ok(Self::Chat),
            Some("generate") => Ok(Self::Generate),
            Some(other) => anyhow::bail!("unknown mode {other:?}, expected chat or generate"),
            None if url.ends_with("/generate") => Ok(Self::Generate),
            None => Ok(Self::Chat),
        }
    }

    fn body(self, input: &str) -> serde_json::Value {
        match self {
            Self::Chat => serde_json::json!({ "user_input": input }),
            Self::Generate => serde_json::json!({ "prompt": input }),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Generate => "generate",
        }
    }
}


#[derive(Default)]
struct Tally {
    latencies: Vec<Duration>,
    /// Transport failures and non-2xx statuses.
    failed: usize,
    /// 200 responses that carry an `error` body, e.g. the model never loaded.
    degraded: usize,
}


// usage: xtask [url] [chat|generate]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/chat".to_string());
    let mode = Mode::parse(std::env::args().nth(2), &url)?;
    let clients = 8usize;
    let per_client = 25usize;

    let client = Client::builder().pool_idle_timeout(Duration::from_secs(10)).build()?;
    let start = Instant::now();
    let tasks: Vec<_> = (0..clients)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let mut tally = Tally::default();
                for _ in 0..per_client {
                    let input = INPUTS.choose(&mut thread_rng()).copied().unwrap_or_default();
                    let t0 = Instant::now();
                    let res = client.post(&url).json(&mode.body(input)).send().await;
                    let dur = t0.elapsed();
                    match res {
                        Ok(r) if r.status().is_success() => match r.json::<serde_json::Value>().await {
                            Ok(v) if v.get("error").is_none() => tally.latencies.push(dur),
                            Ok(_) => tally.degraded += 1,
                            Err(_) => tally.failed += 1,
                        },
                        _ => tally.failed += 1,
                    }
                }
                tally
            })
        })
        .collect();

    let mut hist = Histogram::<u64>::new(3)?;
    let (mut failed, mut degraded) = (0usize, 0usize);
    for t in tasks {
        let tally = t.await?;
        for d in tally.latencies { hist.record(d.as_millis() as u64).ok(); }
        failed += tally.failed;
        degraded += tally.degraded;
    }

    let m = mode.name();
    println!("[{m}] {} requests to {url} in {:?}", clients * per_client, start.elapsed());
    println!("[{m}] ok: {}  failed: {failed}  degraded: {degraded}", hist.len());
    for q in [0.50, 0.95, 0.99] {
        println!("[{m}] p{:.0}: {} ms", q * 100.0, hist.value_at_quantile(q));
    }
    println!("[{m}] max: {} ms", hist.max());
    Ok(())
}
