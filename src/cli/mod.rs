use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Tree Store Args ---
    /// Tree store type (file, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "file")]
    pub store_type: String,

    /// Path of the JSON store file when the store type is "file".
    #[arg(long, env = "STORE_PATH", default_value = "data/arbor_store.json")]
    pub store_path: String,

    /// Workspace whose conversation tree is opened at startup.
    #[arg(long, env = "WORKSPACE", default_value = "default")]
    pub workspace: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (ollama, openai, anthropic, gemini)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "ollama")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (e.g., OpenAI, Anthropic, Gemini)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o, llama3, claude-sonnet-4-20250514)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- General App Args ---
    /// Optional system prompt seeded as the first message of a freshly
    /// created tree.
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_flags() {
        let args = Args::parse_from(["arbor-chat"]);
        assert_eq!(args.store_type, "file");
        assert_eq!(args.workspace, "default");
        assert_eq!(args.chat_llm_type, "ollama");
        assert!(args.chat_model.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "arbor-chat",
            "--store-type",
            "memory",
            "--workspace",
            "research",
            "--chat-llm-type",
            "openai",
            "--chat-api-key",
            "sk-test",
        ]);
        assert_eq!(args.store_type, "memory");
        assert_eq!(args.workspace, "research");
        assert_eq!(args.chat_llm_type, "openai");
        assert_eq!(args.chat_api_key, "sk-test");
    }
}
