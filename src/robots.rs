use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Allow or Disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: String,
    is_allow: bool,
}

/// One `User-agent` block; consecutive agent lines share the block
#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt for the audited host
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

impl RobotsPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Fetches robots.txt for the host of `base_url`.
    /// Missing or unreachable files allow everything.
    pub async fn fetch(client: &Client, base_url: &Url) -> Self {
        let mut robots_url = base_url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        let response = match client.get(robots_url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::info!(url = %robots_url, error = %e, "robots.txt unreachable, allowing all paths");
                return Self::allow_all();
            }
        };

        if !response.status().is_success() {
            tracing::info!(
                url = %robots_url,
                status = %response.status(),
                "robots.txt not found, allowing all paths"
            );
            return Self::allow_all();
        }

        match response.text().await {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::info!(url = %robots_url, error = %e, "robots.txt unreadable, allowing all paths");
                Self::allow_all()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // A rule line closes the agent list; the next User-agent starts a new group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !collecting_agents && let Some(done) = current.take() {
                        groups.push(done);
                    }
                    current
                        .get_or_insert_with(Group::default)
                        .agents
                        .push(value.to_lowercase());
                    collecting_agents = true;
                }
                "disallow" | "allow" => {
                    collecting_agents = false;
                    if let Some(group) = current.as_mut()
                        && !value.is_empty()
                    {
                        group.rules.push(Rule {
                            pattern: value.to_string(),
                            is_allow: field == "allow",
                        });
                    }
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let Some(group) = current.as_mut() {
                        group.crawl_delay = value
                            .parse::<f64>()
                            .ok()
                            .filter(|delay| delay.is_finite() && *delay >= 0.0);
                    }
                }
                _ => {
                    // Sitemap and unknown directives
                }
            }
        }

        if let Some(done) = current {
            groups.push(done);
        }

        Self { groups }
    }

    /// The agent's own group if present, otherwise the wildcard group
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let agent = user_agent.to_lowercase();
        self.groups
            .iter()
            .find(|group| group.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|group| group.agents.iter().any(|a| a == "*"))
            })
    }

    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        match self.group_for(user_agent) {
            Some(group) => check_rules(&group.rules, url.path()),
            None => true,
        }
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|group| group.crawl_delay)
            .map(Duration::from_secs_f64)
    }
}

/// Longest matching pattern wins; ties go to the later rule
fn check_rules(rules: &[Rule], path: &str) -> bool {
    let mut allowed = true;
    let mut most_specific_length = 0;

    for rule in rules {
        if path_matches(&rule.pattern, path) {
            let pattern_len = rule.pattern.len();
            if pattern_len >= most_specific_length {
                most_specific_length = pattern_len;
                allowed = rule.is_allow;
            }
        }
    }

    allowed
}

/// Prefix match with `*` wildcards and a `$` end anchor
fn path_matches(pattern: &str, path: &str) -> bool {
    let (pattern, must_end) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if must_end {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let pattern_chars: Vec<char> = pattern.chars().collect();
    let path_chars: Vec<char> = path.chars().collect();
    wildcard_match(&pattern_chars, &path_chars, must_end)
}

fn wildcard_match(pattern: &[char], path: &[char], must_end: bool) -> bool {
    match pattern.split_first() {
        None => !must_end || path.is_empty(),
        Some(('*', rest)) => (0..=path.len()).any(|i| wildcard_match(rest, &path[i..], must_end)),
        Some((c, rest)) => path
            .split_first()
            .is_some_and(|(p, path_rest)| p == c && wildcard_match(rest, path_rest, must_end)),
    }
}
