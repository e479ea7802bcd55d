/// Parsed User-Agent fields, used to fill descriptor columns the client
/// did not assert itself.
pub struct UaInfo {
    pub browser: String,
    pub os: String,
    pub device_type: String,
}

/// Parse a `User-Agent` string via the `woothee` crate.
///
/// Returns `None` if the UA string is empty or woothee cannot classify it.
pub fn parse_user_agent(user_agent: &str) -> Option<UaInfo> {
    if user_agent.is_empty() {
        return None;
    }

    let result = woothee::parser::Parser::new().parse(user_agent)?;

    // woothee `category` maps to our device_type convention:
    //   "smartphone" / "mobilephone" → "mobile"
    //   "tablet"                     → "tablet"
    //   everything else              → "desktop"
    let device_type = match result.category {
        "smartphone" | "mobilephone" => "mobile",
        "tablet" => "tablet",
        _ => "desktop",
    }
    .to_string();

    Some(UaInfo {
        browser: result.name.to_string(),
        os: result.os.to_string(),
        device_type,
    })
}

const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "spider",
    "crawler",
    "googlebot",
    "bingbot",
    "duckduckbot",
    "yandexbot",
    "baiduspider",
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "headlesschrome",
    "phantomjs",
    "python-requests",
    "curl/",
    "wget/",
    "go-http-client",
    "libwww-perl",
    "urllib",
    "httpclient",
];

/// Classify a user-agent as automated traffic.
///
/// An empty or missing UA is treated as human (fail open toward counting):
/// losing legitimate low-fidelity traffic is worse than occasionally
/// counting a shy crawler.
pub fn is_automated(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }

    if woothee::parser::Parser::new()
        .parse(user_agent)
        .is_some_and(|r| r.category == "crawler")
    {
        return true;
    }

    let ua = user_agent.to_ascii_lowercase();
    BOT_SIGNATURES.iter().any(|sig| ua.contains(sig))
}
