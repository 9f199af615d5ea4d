//! 通用工具函数

/// 处置意见中出现 "alta"（不区分大小写）即视为出院
pub fn mentions_discharge(course_of_action: &str) -> bool {
    course_of_action.to_lowercase().contains("alta")
}

/// 空白文本视为未填写
pub fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_discharge() {
        assert!(mentions_discharge("Alta médica con tratamiento ambulatorio"));
        assert!(mentions_discharge("se indica ALTA"));
        assert!(!mentions_discharge("Hospitalizar en observación"));
        assert!(!mentions_discharge(""));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  V123 ")), Some("V123"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
