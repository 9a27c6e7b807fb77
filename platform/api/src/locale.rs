/// Language used for client-facing text. Chosen once per request at ingress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

/// Validation message catalog keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Msg {
    Required,
    NotAString,
    NotAnInteger,
    NotAnObject,
    NotAList,
    EmptyList,
    InvalidChoice,
    DuplicateAction,
    Expired,
    MustBeAbsent,
}

impl Locale {
    /// Picks the first language tag of an `Accept-Language` header.
    pub fn from_accept_language(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::default();
        };
        let primary = header
            .split(',')
            .next()
            .and_then(|tag| tag.split(';').next())
            .map(|tag| tag.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if primary.starts_with("zh") {
            Locale::Zh
        } else {
            Locale::En
        }
    }

    pub fn text(self, msg: Msg) -> &'static str {
        match (self, msg) {
            (Locale::En, Msg::Required) => "This field is required.",
            (Locale::En, Msg::NotAString) => "Not a valid string.",
            (Locale::En, Msg::NotAnInteger) => "A valid integer is required.",
            (Locale::En, Msg::NotAnObject) => "Invalid data. Expected a dictionary.",
            (Locale::En, Msg::NotAList) => "Expected a list of items.",
            (Locale::En, Msg::EmptyList) => "This list may not be empty.",
            (Locale::En, Msg::InvalidChoice) => "Not a valid choice.",
            (Locale::En, Msg::DuplicateAction) => "Action ids must be unique.",
            (Locale::En, Msg::Expired) => "Expiration time must be in the future.",
            (Locale::En, Msg::MustBeAbsent) => "This field must be omitted here.",
            (Locale::Zh, Msg::Required) => "该字段是必填项。",
            (Locale::Zh, Msg::NotAString) => "不是有效的字符串。",
            (Locale::Zh, Msg::NotAnInteger) => "请填写合法的整数值。",
            (Locale::Zh, Msg::NotAnObject) => "无效数据。期待为字典类型。",
            (Locale::Zh, Msg::NotAList) => "期望为一个包含物件的列表。",
            (Locale::Zh, Msg::EmptyList) => "列表不能为空。",
            (Locale::Zh, Msg::InvalidChoice) => "不是合法选项。",
            (Locale::Zh, Msg::DuplicateAction) => "操作ID不能重复。",
            (Locale::Zh, Msg::Expired) => "过期时间必须晚于当前时间。",
            (Locale::Zh, Msg::MustBeAbsent) => "此处不能提供该字段。",
        }
    }

    pub fn method_not_allowed(self, method: &str) -> String {
        match self {
            Locale::En => format!("Method \"{method}\" not allowed."),
            Locale::Zh => format!("方法 “{method}” 不被允许。"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_language_uses_primary_tag() {
        assert_eq!(Locale::from_accept_language(Some("zh-CN,zh;q=0.9,en;q=0.8")), Locale::Zh);
        assert_eq!(Locale::from_accept_language(Some("en-US,zh;q=0.5")), Locale::En);
        assert_eq!(Locale::from_accept_language(None), Locale::En);
    }

    #[test]
    fn catalog_is_localized() {
        assert_eq!(Locale::En.text(Msg::Required), "This field is required.");
        assert_ne!(Locale::Zh.text(Msg::Required), Locale::En.text(Msg::Required));
    }
}
