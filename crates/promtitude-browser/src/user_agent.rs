use rand::seq::SliceRandom;

/// Current desktop Chrome user agents, one per common platform.
const DESKTOP_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// User agent for a new browser session: the configured one if set and
/// non-blank, otherwise a random desktop agent.
pub fn choose_user_agent(configured: Option<&str>) -> String {
    match configured.map(str::trim).filter(|ua| !ua.is_empty()) {
        Some(ua) => ua.to_string(),
        None => DESKTOP_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(DESKTOP_AGENTS[0])
            .to_string(),
    }
}
