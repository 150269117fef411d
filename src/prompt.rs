//! Prompt construction for the generate service.

use crate::model::{ChatMessage, ChatRole};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Kai, an expert AI interview coach conducting a realistic mock interview. \
Be encouraging, professional and insightful. Ask one question at a time and keep answers concise.";

/// Exactly one system turn followed by one user turn. Nothing from earlier requests.
pub fn interview_messages(system: &str, prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(ChatRole::System, system),
        ChatMessage::new(ChatRole::User, prompt),
    ]
}

/// ChatML, used when a model ships without an embedded chat template.
pub fn render_chatml(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str("<|im_start|>");
        out.push_str(m.role.as_str());
        out.push('\n');
        out.push_str(&m.content);
        out.push_str("<|im_end|>\n");
    }
    if add_generation_prompt {
        out.push_str("<|im_start|>assistant\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_message_template() {
        let msgs = interview_messages("sys", "Tell me about yourself");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, ChatRole::System);
        assert_eq!(msgs[0].content, "sys");
        assert_eq!(msgs[1].role, ChatRole::User);
        assert_eq!(msgs[1].content, "Tell me about yourself");
    }

    #[test]
    fn chatml_with_generation_prompt() {
        let msgs = interview_messages("be brief", "hi");
        assert_eq!(
            render_chatml(&msgs, true),
            "<|im_start|>system\nbe brief<|im_end|>\n<|im_start|>user\nhi<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn chatml_without_generation_prompt() {
        let msgs = vec![ChatMessage::new(ChatRole::Assistant, "ok")];
        assert_eq!(render_chatml(&msgs, false), "<|im_start|>assistant\nok<|im_end|>\n");
    }
}
