use super::{ChatMessage, InferParams, LlmBackend};
use anyhow::Result;
use encoding_rs::{CoderResult, Decoder};
use std::path::PathBuf;

/// Runtime knobs fixed at load time.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub n_ctx: u32,
    pub n_batch: u32,
    pub n_gpu_layers: u32,
    pub n_threads: i32,
}

/// How `InferParams::max_tokens` bounds a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenCap {
    /// Prompt plus generated tokens.
    Total(i32),
    /// Generated tokens only.
    New(i32),
}

/// Tokens left to generate once `n_prompt` tokens are in a context of `n_ctx`,
/// keeping `reserve` slots free. Errors when nothing is left.
pub fn new_token_budget(n_prompt: usize, cap: TokenCap, n_ctx: u32, reserve: i32) -> Result<i32> {
    let prompt = i32::try_from(n_prompt).unwrap_or(i32::MAX);
    let room = i32::try_from(n_ctx)
        .unwrap_or(i32::MAX)
        .saturating_sub(reserve)
        .saturating_sub(prompt);
    let budget = match cap {
        TokenCap::Total(total) => total.saturating_sub(prompt).min(room),
        TokenCap::New(n) => n.min(room),
    };
    if budget <= 0 {
        anyhow::bail!("prompt too long for context ({} tokens)", n_prompt);
    }
    Ok(budget)
}

/// llama.cpp clamps a causal context's batch to `n_ctx`; prompt chunks must fit both.
pub fn prompt_batch_size(n_batch: u32, n_ctx: u32) -> u32 {
    n_batch.min(n_ctx).max(1)
}

/// Append the UTF-8 text for `bytes`, holding back a split multi-byte sequence until
/// the next call. `last` flushes whatever is pending.
pub fn push_decoded(decoder: &mut Decoder, mut bytes: &[u8], out: &mut String, last: bool) {
    loop {
        if let Some(n) = decoder.max_utf8_buffer_length(bytes.len()) {
            out.reserve(n);
        }
        let (result, read, _) = decoder.decode_to_string(bytes, out, last);
        match result {
            CoderResult::InputEmpty => return,
            CoderResult::OutputFull => bytes = &bytes[read..],
        }
    }
}

#[cfg(not(any(feature = "llama", feature = "mock-llama")))]
compile_error!("enable either the `llama` or the `mock-llama` feature");

// Mock backend. Deterministic text without llama.cpp, for exercising the HTTP surface.
#[cfg(all(feature = "mock-llama", not(feature = "llama")))]
#[derive(Clone)]
pub struct LlamaBackend {
    _opts: LoadOptions,
}

#[cfg(all(feature = "mock-llama", not(feature = "llama")))]
impl LlamaBackend {
    pub fn new(_model_path: PathBuf, opts: LoadOptions) -> Result<Self> {
        Ok(Self { _opts: opts })
    }
}

#[cfg(all(feature = "mock-llama", not(feature = "llama")))]
#[async_trait::async_trait]
impl LlmBackend for LlamaBackend {
    async fn complete(&self, input: &str, _p: &InferParams) -> Result<String> {
        Ok(format!("Thanks. Could you tell me more about \"{}\"?", input.trim()))
    }

    async fn chat(&self, messages: &[ChatMessage], _p: &InferParams) -> Result<String> {
        let user = messages
            .iter()
            .rev()
            .find(|m| m.role == crate::model::ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("Let's talk about {}. What was your role?", user.trim()))
    }
}

// Real llama.cpp backend using `llama-cpp-2` (enabled with feature `llama`).
#[cfg(feature = "llama")]
mod real_backend {
    use super::*;
    use crate::model::Sampling;
    use crate::prompt::render_chatml;
    use anyhow::{anyhow, bail, Context};
    use llama_cpp_2::context::params::LlamaContextParams;
    use llama_cpp_2::llama_backend::LlamaBackend as LLBackend;
    use llama_cpp_2::llama_batch::LlamaBatch;
    use llama_cpp_2::model::params::LlamaModelParams;
    use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel, Special};
    use llama_cpp_2::sampling::LlamaSampler;
    use llama_cpp_2::token::LlamaToken;
    use llama_cpp_2::{ggml_time_us, send_logs_to_tracing, LogOptions};
    use std::num::NonZeroU32;
    use std::sync::Arc;

    pub struct Inner {
        backend: LLBackend,
        model: LlamaModel,
        opts: LoadOptions,
    }

    #[derive(Clone)]
    pub struct LlamaBackend {
        inner: Arc<Inner>,
    }

    impl LlamaBackend {
        pub fn new(model_path: PathBuf, opts: LoadOptions) -> Result<Self> {
            // route llama.cpp logs to tracing so they appear in server logs when RUST_LOG is set
            send_logs_to_tracing(LogOptions::default());

            let backend = LLBackend::init().context("init llama backend")?;

            let mut model_params = LlamaModelParams::default();
            if opts.n_gpu_layers > 0 {
                model_params = model_params.with_n_gpu_layers(opts.n_gpu_layers);
            }

            let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
                .with_context(|| format!("load GGUF model {:?}", model_path))?;

            tracing::info!(
                n_ctx_train = model.n_ctx_train(),
                n_ctx = opts.n_ctx,
                n_gpu_layers = opts.n_gpu_layers,
                "model loaded"
            );

            Ok(Self { inner: Arc::new(Inner { backend, model, opts }) })
        }
    }

    impl Inner {
        fn render_chat(&self, messages: &[ChatMessage]) -> Result<String> {
            let chat = messages
                .iter()
                .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
                .collect::<Result<Vec<_>, _>>()
                .context("build chat messages")?;

            let template = match self.model.chat_template(None) {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(error = %e, "model has no chat template, using ChatML");
                    return Ok(render_chatml(messages, true));
                }
            };

            match self.model.apply_chat_template(&template, &chat, true) {
                Ok(text) => Ok(text),
                Err(e) => {
                    tracing::warn!(error = %e, "embedded chat template not supported, using ChatML");
                    Ok(render_chatml(messages, true))
                }
            }
        }

        fn sampler(p: &InferParams) -> LlamaSampler {
            match p.sampling {
                Sampling::Greedy => LlamaSampler::greedy(),
                Sampling::Stochastic => LlamaSampler::chain_simple([
                    LlamaSampler::temp(p.temp),
                    LlamaSampler::top_p(p.top_p, 1),
                    LlamaSampler::min_p(p.min_p, 1),
                    LlamaSampler::penalties(64, p.repeat_penalty, 0.0, 0.0),
                    LlamaSampler::dist(p.seed),
                ]),
            }
        }

        /// Decode `tokens` into a fresh context, then sample up to `max_new` tokens.
        fn generate(&self, tokens: Vec<LlamaToken>, max_new: i32, p: &InferParams) -> Result<String> {
            if tokens.is_empty() {
                bail!("empty prompt after tokenization");
            }

            // Fresh context per request: nothing carries over between calls.
            let n_ctx = NonZeroU32::new(self.opts.n_ctx).ok_or_else(|| anyhow!("n_ctx must be > 0"))?;
            let n_batch = prompt_batch_size(self.opts.n_batch, self.opts.n_ctx);
            let ctx_params = LlamaContextParams::default()
                .with_n_ctx(Some(n_ctx))
                .with_n_batch(n_batch)
                .with_n_threads(self.opts.n_threads)
                .with_n_threads_batch(self.opts.n_threads);

            let mut ctx = self
                .model
                .new_context(&self.backend, ctx_params)
                .context("create llama context")?;

            // Prompt goes in n_batch sized chunks; logits only for the final token.
            let mut batch = LlamaBatch::new(n_batch as usize, 1);
            let last_index = tokens.len() as i32 - 1;
            let mut n_cur: i32 = 0;
            for chunk in tokens.chunks(n_batch as usize) {
                batch.clear();
                for &token in chunk {
                    batch.add(token, n_cur, &[0], n_cur == last_index)?;
                    n_cur += 1;
                }
                ctx.decode(&mut batch).context("decode prompt")?;
            }

            let mut sampler = Self::sampler(p);
            let mut out = String::new();
            let mut decoder = encoding_rs::UTF_8.new_decoder();
            let mut n_decode = 0;
            let t_main_start = ggml_time_us();

            while n_decode < max_new {
                let token = sampler.sample(&ctx, batch.n_tokens() - 1);
                sampler.accept(token);

                if self.model.is_eog_token(token) {
                    break;
                }

                // Plaintext drops control tokens from the rendered output.
                let bytes = self.model.token_to_bytes(token, Special::Plaintext)?;
                push_decoded(&mut decoder, &bytes, &mut out, false);

                batch.clear();
                batch.add(token, n_cur, &[0], true)?;
                n_cur += 1;
                ctx.decode(&mut batch).context("decode step")?;
                n_decode += 1;
            }
            push_decoded(&mut decoder, &[], &mut out, true);

            let elapsed_us = (ggml_time_us() - t_main_start).max(1);
            tracing::debug!(
                n_prompt = tokens.len(),
                n_decode,
                tok_per_s = n_decode as f64 / (elapsed_us as f64 / 1_000_000.0),
                "generation finished"
            );

            Ok(out)
        }

        fn complete_blocking(&self, input: &str, p: &InferParams) -> Result<String> {
            let mut tokens = self
                .model
                .str_to_token(input, AddBos::Always)
                .with_context(|| format!("tokenize input: {}", input))?;
            tokens.push(self.model.token_eos());

            let max_new = new_token_budget(tokens.len(), TokenCap::Total(p.max_tokens), self.opts.n_ctx, 0)?;
            self.generate(tokens, max_new, p)
        }

        fn chat_blocking(&self, messages: &[ChatMessage], p: &InferParams) -> Result<String> {
            let prompt = self.render_chat(messages)?;
            let tokens = self
                .model
                .str_to_token(&prompt, AddBos::Always)
                .context("tokenize chat prompt")?;

            // Safety margin: ensure we don't exceed context window
            let max_new = new_token_budget(tokens.len(), TokenCap::New(p.max_tokens), self.opts.n_ctx, 8)?;
            self.generate(tokens, max_new, p)
        }
    }

    #[async_trait::async_trait]
    impl LlmBackend for LlamaBackend {
        async fn complete(&self, input: &str, p: &InferParams) -> Result<String> {
            let inner = self.inner.clone();
            let input = input.to_string();
            let p = p.clone();
            tokio::task::spawn_blocking(move || inner.complete_blocking(&input, &p))
                .await
                .context("inference task panicked")?
        }

        async fn chat(&self, messages: &[ChatMessage], p: &InferParams) -> Result<String> {
            let inner = self.inner.clone();
            let messages = messages.to_vec();
            let p = p.clone();
            tokio::task::spawn_blocking(move || inner.chat_blocking(&messages, &p))
                .await
                .context("inference task panicked")?
        }
    }

    pub use LlamaBackend as RealLlamaBackend;
}

#[cfg(feature = "llama")]
pub use real_backend::RealLlamaBackend as LlamaBackend;
