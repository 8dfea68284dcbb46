use crate::models::{SettingType, SettingsByCategory, SystemSetting};
use serde_json::{Value, json};

/// DefaultSetting
///
/// A catalog entry: the category a setting belongs to and its factory value. The catalog
/// seeds an empty store and backs `POST /api/settings/reset`.
#[derive(Debug, Clone)]
pub struct DefaultSetting {
    pub category: &'static str,
    pub key: &'static str,
    pub value: Value,
    pub description: &'static str,
    pub setting_type: SettingType,
}

impl DefaultSetting {
    pub fn to_setting(&self) -> SystemSetting {
        SystemSetting {
            key: self.key.to_string(),
            value: self.value.clone(),
            description: self.description.to_string(),
            setting_type: self.setting_type,
            updated_at: None,
        }
    }
}

/// default_settings
///
/// Factory values of every setting the dashboard knows about.
pub fn default_settings() -> Vec<DefaultSetting> {
    vec![
        DefaultSetting {
            category: "general",
            key: "app_name",
            value: json!("Provision Error Log Analysis"),
            description: "Application name",
            setting_type: SettingType::String,
        },
        DefaultSetting {
            category: "general",
            key: "max_file_size",
            value: json!(10_485_760),
            description: "Maximum file upload size in bytes",
            setting_type: SettingType::Number,
        },
        DefaultSetting {
            category: "features",
            key: "enable_ocr",
            value: json!(true),
            description: "Enable OCR functionality",
            setting_type: SettingType::Boolean,
        },
        DefaultSetting {
            category: "ai",
            key: "ai_timeout",
            value: json!(30_000),
            description: "AI analysis timeout in milliseconds",
            setting_type: SettingType::Number,
        },
        DefaultSetting {
            category: "notifications",
            key: "enable_real_time_alerts",
            value: json!(true),
            description: "Enable real-time alert notifications",
            setting_type: SettingType::Boolean,
        },
        DefaultSetting {
            category: "security",
            key: "session_timeout",
            value: json!(3600),
            description: "Session timeout in seconds",
            setting_type: SettingType::Number,
        },
    ]
}

/// group_by_category
///
/// Builds the category map returned to the dashboard. Categories come out sorted (BTreeMap)
/// and each list is sorted by key.
pub fn group_by_category(
    entries: impl IntoIterator<Item = (String, SystemSetting)>,
) -> SettingsByCategory {
    let mut grouped = SettingsByCategory::new();
    for (category, setting) in entries {
        grouped.entry(category).or_default().push(setting);
    }
    for settings in grouped.values_mut() {
        settings.sort_by(|a, b| a.key.cmp(&b.key));
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_values_match_their_declared_types() {
        for entry in default_settings() {
            assert!(
                entry.setting_type.accepts(&entry.value),
                "{} has a value of the wrong type",
                entry.key
            );
        }
    }

    #[test]
    fn grouping_sorts_categories_and_keys() {
        let grouped = group_by_category(
            default_settings()
                .into_iter()
                .rev()
                .map(|d| (d.category.to_string(), d.to_setting())),
        );
        let categories: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(
            categories,
            vec!["ai", "features", "general", "notifications", "security"]
        );
        let general: Vec<_> = grouped["general"].iter().map(|s| s.key.as_str()).collect();
        assert_eq!(general, vec!["app_name", "max_file_size"]);
    }
}
