use rand::seq::SliceRandom;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Browser identity presented to the portal.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
}

impl FingerprintConfig {
    /// Random desktop user agent with the given viewport.
    ///
    /// The portal lays its result grid out for desktop widths, so the
    /// viewport comes from configuration rather than being randomized.
    pub fn randomized(viewport_width: u32, viewport_height: u32) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        Self {
            user_agent: user_agent.to_string(),
            viewport_width,
            viewport_height,
            locale: "es-PE".to_string(),
        }
    }

    /// Extra Chromium command-line arguments for this identity.
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            format!("--user-agent={}", self.user_agent),
            format!("--lang={}", self.locale),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized(1920, 1080);
        assert!(USER_AGENTS.contains(&config.user_agent.as_str()));
        assert_eq!(config.viewport_width, 1920);
        assert_eq!(config.viewport_height, 1080);
    }

    #[test]
    fn test_fingerprint_variation() {
        let configs: Vec<_> = (0..20)
            .map(|_| FingerprintConfig::randomized(1366, 768))
            .collect();

        let first_ua = &configs[0].user_agent;
        let all_same = configs.iter().all(|c| &c.user_agent == first_ua);
        assert!(!all_same, "Expected variation in user agents");
    }

    #[test]
    fn test_launch_args() {
        let config = FingerprintConfig::randomized(1920, 1080);
        let args = config.launch_args();
        assert!(args[0].starts_with("--user-agent=Mozilla/5.0"));
        assert_eq!(args[1], "--lang=es-PE");
    }
}
