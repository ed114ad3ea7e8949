use url::Url;

pub const WEBHOOK_HOST: &str = "discord.com";

const LEGACY_WEBHOOK_PREFIX: &str = "/api/webhooks/";
const VERSIONED_WEBHOOK_PREFIX: &str = "/api/v10/webhooks/";
const WITH_COMPONENTS: &str = "with_components";
const THREAD_ID: &str = "thread_id";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedTarget {
    pub url: Option<Url>,
    pub thread_id: Option<String>,
}

impl ResolvedTarget {
    pub fn is_sendable(&self) -> bool {
        self.url.is_some()
    }
}

/// Never fails: an unparsable URL yields a target with no request URL.
pub fn resolve(raw: &str) -> ResolvedTarget {
    let Ok(original) = Url::parse(raw.trim()) else {
        return ResolvedTarget::default();
    };

    let thread_id = thread_id(&original);
    let mut url = original;

    if url.host_str() == Some(WEBHOOK_HOST) {
        if let Some(rest) = url.path().strip_prefix(LEGACY_WEBHOOK_PREFIX) {
            let path = format!("{VERSIONED_WEBHOOK_PREFIX}{rest}");
            // Non-special schemes refuse the switch; the URL is still usable as given.
            let _ = url.set_scheme("https");
            url.set_path(&path);
        }
    }

    set_query_param(&mut url, WITH_COMPONENTS, "true");

    ResolvedTarget {
        url: Some(url),
        thread_id,
    }
}

fn thread_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == THREAD_ID)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Overwrites the first occurrence in place, drops duplicates, appends when absent.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut replaced = false;
    let mut pairs: Vec<(String, String)> = Vec::new();

    for (name, current) in url.query_pairs() {
        if name == key {
            if !replaced {
                pairs.push((name.into_owned(), value.to_owned()));
                replaced = true;
            }
        } else {
            pairs.push((name.into_owned(), current.into_owned()));
        }
    }

    if !replaced {
        pairs.push((key.to_owned(), value.to_owned()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
}
