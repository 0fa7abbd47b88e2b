//! Column names shared by the merge and preparation stages, and the
//! feature contract consumed by the trained model.

pub const USER_ID: &str = "user_id";
pub const AUTHOR: &str = "author";
pub const SITE: &str = "site";
pub const SUBSCRIPTION: &str = "subscription";
pub const SUBSCRIPTION_TYPE: &str = "subscription_type";
pub const SUBSCRIPTION_START_DATE: &str = "subscription_start_date";
pub const ORIGINAL_URL_HOST: &str = "original_url_host";
pub const CREATED_AT: &str = "created_at";

/// Training label
pub const USER_CLICKED: &str = "user_clicked";

pub const IS_SUBSCRIPTION: &str = "is_subscription";
pub const HAS_AUTHOR: &str = "has_author";
pub const DAYS_SINCE_SUBSCRIBED: &str = "days_since_subscribed";
pub const IS_FEED: &str = "is_feed";
pub const IS_NEWSLETTER: &str = "is_newsletter";

/// Columns derived by the preparer rather than read from the input
pub const DERIVED_COLUMNS: &[&str] = &[
    IS_SUBSCRIPTION,
    HAS_AUTHOR,
    DAYS_SINCE_SUBSCRIBED,
    IS_FEED,
    IS_NEWSLETTER,
];

/// Source columns the preparer reads
pub const REQUIRED_COLUMNS: &[&str] = &[
    CREATED_AT,
    SUBSCRIPTION_START_DATE,
    SUBSCRIPTION,
    AUTHOR,
    SUBSCRIPTION_TYPE,
    USER_CLICKED,
];

/// Default ordered feature set.
///
/// The `user_<key>_*` columns come from the preference tables, one pair per
/// join key.
pub const FEATURE_COLUMNS: &[&str] = &[
    IS_SUBSCRIPTION,
    HAS_AUTHOR,
    DAYS_SINCE_SUBSCRIBED,
    IS_FEED,
    IS_NEWSLETTER,
    "user_author_save_count",
    "user_author_click_count",
    "user_site_save_count",
    "user_site_click_count",
    "user_subscription_save_count",
    "user_subscription_click_count",
    "user_original_url_host_save_count",
    "user_original_url_host_click_count",
];

pub fn default_feature_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}
