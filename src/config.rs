use crate::model::{llama::LoadOptions, InferParams, ModelSource, Sampling};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "interview-llm", version, about = "Interview LLM text-generation service")]
pub struct Config {
    #[arg(long, env, default_value = "0.0.0.0:8080", global = true)]
    pub bind_addr: String,
    #[arg(long, env, default_value_t = 2048, global = true)]
    pub n_ctx: u32,
    #[arg(long, env, default_value_t = 512, global = true)]
    pub n_batch: u32,
    /// Defaults to every available core.
    #[arg(long, env, global = true)]
    pub n_threads: Option<i32>,
    #[command(subcommand)]
    pub service: Service,
}

/// One process serves exactly one of these.
#[derive(Subcommand, Debug, Clone)]
pub enum Service {
    /// Raw completion behind `POST /chat` (greedy, CPU-oriented).
    Chat(ChatArgs),
    /// System + user chat template behind `POST /generate` (sampled, GPU-oriented).
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Local GGUF file; skips the hub download when set.
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,
    #[arg(long, env = "HF_REPO", default_value = "Qwen/Qwen2.5-0.5B-Instruct-GGUF")]
    pub hf_repo: String,
    #[arg(long, env = "HF_FILE", default_value = "qwen2.5-0.5b-instruct-q4_k_m.gguf")]
    pub hf_file: String,
    #[arg(long, env, default_value_t = 0)]
    pub n_gpu_layers: u32,
    /// Cap on prompt plus generated tokens.
    #[arg(long, env, default_value_t = 1000)]
    pub max_length: i32,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,
    #[arg(long, env = "HF_REPO", default_value = "bartowski/Meta-Llama-3.1-8B-Instruct-GGUF")]
    pub hf_repo: String,
    #[arg(long, env = "HF_FILE", default_value = "Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf")]
    pub hf_file: String,
    #[arg(long, env, default_value_t = 999)]
    pub n_gpu_layers: u32,
    #[arg(long, env, default_value_t = 512)]
    pub max_tokens: i32,
    #[arg(long, env, default_value_t = 0.7)]
    pub temp: f32,
    #[arg(long, env, default_value_t = 0.95)]
    pub top_p: f32,
    #[arg(long, env, default_value_t = 0.05)]
    pub min_p: f32,
    #[arg(long, env, default_value_t = 1.1)]
    pub repeat_penalty: f32,
    #[arg(long, env, default_value_t = 1234)]
    pub seed: u32,
    /// Replaces the built-in interview-coach system prompt.
    #[arg(long, env)]
    pub system_prompt_file: Option<PathBuf>,
}

impl Config {
    pub fn load_options(&self, n_gpu_layers: u32) -> LoadOptions {
        LoadOptions {
            n_ctx: self.n_ctx,
            n_batch: self.n_batch,
            n_gpu_layers,
            n_threads: self.n_threads.unwrap_or_else(|| num_cpus::get() as i32),
        }
    }
}

impl ChatArgs {
    pub fn model_source(&self) -> ModelSource {
        ModelSource::from_parts(self.model_path.clone(), &self.hf_repo, &self.hf_file)
    }

    pub fn infer_params(&self) -> InferParams {
        InferParams::greedy(self.max_length)
    }
}

impl GenerateArgs {
    pub fn model_source(&self) -> ModelSource {
        ModelSource::from_parts(self.model_path.clone(), &self.hf_repo, &self.hf_file)
    }

    pub fn infer_params(&self) -> InferParams {
        InferParams {
            max_tokens: self.max_tokens,
            sampling: Sampling::Stochastic,
            temp: self.temp,
            top_p: self.top_p,
            min_p: self.min_p,
            repeat_penalty: self.repeat_penalty,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_defaults() {
        let cfg = Config::try_parse_from(["interview-llm", "chat", "--hf-repo", "org/small"]).unwrap();
        assert_eq!(cfg.n_ctx, 2048);
        let Service::Chat(args) = &cfg.service else { panic!("expected chat") };
        assert_eq!(args.max_length, 1000);
        assert_eq!(args.n_gpu_layers, 0);
        assert!(matches!(args.model_source(), ModelSource::HuggingFace { ref repo, .. } if repo == "org/small"));

        let p = args.infer_params();
        assert_eq!(p.sampling, Sampling::Greedy);
        assert_eq!(p.max_tokens, 1000);
    }

    #[test]
    fn generate_overrides() {
        let cfg = Config::try_parse_from([
            "interview-llm",
            "generate",
            "--model-path",
            "/models/m.gguf",
            "--temp",
            "0.2",
            "--n-ctx",
            "4096",
            "--n-threads",
            "3",
        ])
        .unwrap();
        let Service::Generate(args) = &cfg.service else { panic!("expected generate") };
        assert_eq!(args.model_source(), ModelSource::Local("/models/m.gguf".into()));
        assert_eq!(args.infer_params().sampling, Sampling::Stochastic);
        assert!((args.infer_params().temp - 0.2).abs() < f32::EPSILON);

        let opts = cfg.load_options(args.n_gpu_layers);
        assert_eq!(opts.n_ctx, 4096);
        assert_eq!(opts.n_threads, 3);
        assert_eq!(opts.n_gpu_layers, 999);
    }

    #[test]
    fn service_is_required() {
        assert!(Config::try_parse_from(["interview-llm"]).is_err());
    }
}
