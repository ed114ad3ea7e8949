use crate::protocol::ComponentTree;

/// Compact JSON for the component tree with every `"` escaped, ready to paste
/// inside a double-quoted string literal.
pub fn render(tree: &ComponentTree) -> String {
    let json = serde_json::to_string(tree).unwrap_or_else(|_| "[]".to_owned());
    json.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn unescape(text: &str) -> String {
        text.replace("\\\"", "\"")
    }

    fn tree(value: Value) -> ComponentTree {
        ComponentTree::from_value(value).expect("tree")
    }

    #[test]
    fn escapes_quotes() {
        let rendered = render(&tree(json!([{ "content": "hi", "type": 10 }])));
        assert_eq!(rendered, r#"[{\"content\":\"hi\",\"type\":10}]"#);
    }

    #[test]
    fn empty_tree() {
        assert_eq!(render(&ComponentTree::default()), "[]");
    }

    #[test]
    fn unescaping_restores_compact_json() {
        let samples = [
            json!([]),
            json!([{ "type": 17, "accent_color": 5793266, "components": [
                { "type": 10, "content": "# Heading\nplain *markdown*" },
                { "type": 14, "divider": true, "spacing": 1 }
            ]}]),
            json!([{ "type": 10, "content": "say \"hi\" \\ end\\" }]),
            json!([{ "type": 1, "components": [
                { "type": 2, "style": 5, "label": "Open", "url": "https://example.com/?a=1&b=2" }
            ]}]),
        ];

        for sample in samples {
            let state = tree(sample);
            let restored = unescape(&render(&state));
            let expected = serde_json::to_string(&state).expect("serialize");

            assert_eq!(restored, expected);
            let reparsed: Value = serde_json::from_str(&restored).expect("valid json");
            assert_eq!(reparsed, serde_json::to_value(&state).expect("value"));
        }
    }
}
