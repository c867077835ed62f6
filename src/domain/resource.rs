//! Names of the rate-limited resources

pub const CHATGPT: &str = "chatgpt";
pub const CLAUDE: &str = "claude";
pub const GEMINI: &str = "gemini";
pub const DEEPSEEK: &str = "deepseek";
pub const PERPLEXITY: &str = "perplexity";
pub const GROK: &str = "grok";
pub const QWEN: &str = "qwen";
pub const LMARENA: &str = "lmarena";

/// The organizer's own backend API
pub const DASHBOARD: &str = "dashboard";

/// Every resource that ships with a built-in budget
pub const BUILTIN: [&str; 9] = [CHATGPT, CLAUDE, GEMINI, DEEPSEEK, PERPLEXITY, GROK, QWEN, LMARENA, DASHBOARD];

/// Chat platforms scraped by the extension (everything except the dashboard)
pub fn is_platform(name: &str) -> bool {
    name != DASHBOARD && BUILTIN.contains(&name)
}
