//! The Redmine "new time entry" page the importer works against.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ImportError;
use crate::model::ActivityOption;

static PROJECT_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"projects/([^/]+)").expect("valid slug regex"));
static ACTIVITY_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<select[^>]*\bid="time_entry_activity_id"[^>]*>(.*?)</select>"#)
        .expect("valid select regex")
});
static OPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<option[^>]*\bvalue="([^"]*)"[^>]*>(.*?)</option>"#)
        .expect("valid option regex")
});
static LOGGED_IN_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*class="user active"[^>]*href="/users/(\d+)"|<a[^>]*href="/users/(\d+)"[^>]*class="user active""#)
        .expect("valid user regex")
});

/// What the importer needs from the page it runs on.
pub trait PageContext: Send + Sync {
    /// Path of the current location, e.g. `/projects/acme/time_entries/new`.
    fn location_path(&self) -> &str;

    fn current_user_id(&self) -> Option<u64>;

    /// Options of the activity select, `None` when the form has no such control.
    fn activity_options(&self) -> Option<Vec<ActivityOption>>;
}

/// Project identifier embedded in a `/projects/<slug>/...` path.
pub fn project_slug(path: &str) -> Result<String, ImportError> {
    PROJECT_SLUG
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|slug| !slug.is_empty())
        .ok_or_else(|| ImportError::ProjectNotFound(path.to_string()))
}

/// Page described directly in the configuration file.
#[derive(Debug, Clone)]
pub struct StaticPage {
    path: String,
    user_id: Option<u64>,
    activities: Option<Vec<ActivityOption>>,
}

impl StaticPage {
    pub fn new(
        path: impl Into<String>,
        user_id: Option<u64>,
        activities: Option<Vec<ActivityOption>>,
    ) -> Self {
        Self {
            path: path.into(),
            user_id,
            activities,
        }
    }
}

impl PageContext for StaticPage {
    fn location_path(&self) -> &str {
        &self.path
    }

    fn current_user_id(&self) -> Option<u64> {
        self.user_id
    }

    fn activity_options(&self) -> Option<Vec<ActivityOption>> {
        self.activities.clone()
    }
}

/// Page read from a saved HTML snapshot of the time entry form.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    path: String,
    html: String,
}

impl HtmlPage {
    pub fn new(path: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            html: html.into(),
        }
    }
}

impl PageContext for HtmlPage {
    fn location_path(&self) -> &str {
        &self.path
    }

    fn current_user_id(&self) -> Option<u64> {
        let caps = LOGGED_IN_USER.captures(&self.html)?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn activity_options(&self) -> Option<Vec<ActivityOption>> {
        let select = ACTIVITY_SELECT.captures(&self.html)?.get(1)?.as_str();
        let options = OPTION
            .captures_iter(select)
            .filter_map(|c| {
                // The "--- Please select ---" placeholder has an empty value.
                let id = c.get(1)?.as_str().trim().parse().ok()?;
                let name = decode_entities(c.get(2)?.as_str().trim());
                Some(ActivityOption { name, id })
            })
            .collect();
        Some(options)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"
<div id="loggedas">Logged in as <a class="user active" href="/users/17">jdoe</a></div>
<form id="new_time_entry">
  <select name="time_entry[activity_id]" id="time_entry_activity_id">
    <option value="">--- Please select ---</option>
    <option value="9">Development</option>
    <option selected="selected" value="10">Design &amp; UX</option>
  </select>
</form>"#;

    #[test]
    fn slug_from_path() {
        assert_eq!(
            project_slug("/projects/acme-web/time_entries/new").unwrap(),
            "acme-web"
        );
        assert!(matches!(
            project_slug("/time_entries/new"),
            Err(ImportError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn html_page_reads_activity_options() {
        let page = HtmlPage::new("/projects/acme/time_entries/new", FORM);
        assert_eq!(
            page.activity_options().unwrap(),
            vec![
                ActivityOption {
                    name: "Development".into(),
                    id: 9
                },
                ActivityOption {
                    name: "Design & UX".into(),
                    id: 10
                },
            ]
        );
    }

    #[test]
    fn html_page_reads_user_id() {
        let page = HtmlPage::new("/projects/acme/time_entries/new", FORM);
        assert_eq!(page.current_user_id(), Some(17));
        let reversed = r#"<a href="/users/3" class="user active">x</a>"#;
        assert_eq!(HtmlPage::new("/", reversed).current_user_id(), Some(3));
    }

    #[test]
    fn html_page_without_select_has_no_options() {
        let page = HtmlPage::new("/projects/acme", "<html><body></body></html>");
        assert!(page.activity_options().is_none());
        assert!(page.current_user_id().is_none());
    }
}
