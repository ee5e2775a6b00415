use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Taxonomy for generated class definitions, keyed off the declared
/// supertype. `Other` is the catch-all for supertypes we do not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    BusinessService,
    BusinessProcess,
    BusinessOperation,
    Transform,
    RoutingRule,
    Message,
    Test,
    Other,
}

impl ClassKind {
    fn from_supertype(super_class: &str) -> Self {
        if super_class.contains("BusinessService") || super_class.contains("TCPService") {
            ClassKind::BusinessService
        } else if super_class.contains("BusinessProcess") {
            ClassKind::BusinessProcess
        } else if super_class.contains("BusinessOperation") {
            ClassKind::BusinessOperation
        } else if super_class.contains("DataTransform") {
            ClassKind::Transform
        } else if super_class.contains("Rule.Definition") {
            ClassKind::RoutingRule
        } else if super_class.contains("Request")
            || super_class.contains("Response")
            || super_class.contains("Persistent")
        {
            ClassKind::Message
        } else if super_class.contains("TestCase") {
            ClassKind::Test
        } else {
            ClassKind::Other
        }
    }
}

/// One class definition lifted out of a conversational reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedClass {
    pub class_name: String,
    pub class_type: ClassKind,
    pub source: String,
}

/// Extraction result attached to a conversational reply that contained code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub description: String,
    pub classes: Vec<GeneratedClass>,
}

static CLASS_BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(Class\s+[\w.]+\s+Extends\s+[\w.%]+(?:\s*\[.*?\])?\s*\{[\s\S]*?^\})").unwrap()
});
static CLASS_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Class\s+([\w.]+)").unwrap());
static EXTENDS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Extends\s+([\w.%]+)").unwrap());

/// Cheap pre-check before running the block regex over a whole reply.
pub fn contains_code(content: &str) -> bool {
    content.contains("Class ") && content.contains("Extends ") && content.contains('{')
}

/// Lifts class definitions out of freeform reply text. Matches from the
/// `Class` keyword to the first closing brace at line start; no compilation
/// or validation happens here.
pub fn extract_classes(content: &str) -> Vec<GeneratedClass> {
    let mut classes = Vec::new();
    for capture in CLASS_BLOCK_REGEX.captures_iter(content) {
        let source = capture[1].trim().to_string();
        let Some(name) = CLASS_NAME_REGEX.captures(&source) else {
            continue;
        };
        let super_class = EXTENDS_REGEX
            .captures(&source)
            .map(|m| m[1].to_string())
            .unwrap_or_default();
        classes.push(GeneratedClass {
            class_name: name[1].to_string(),
            class_type: ClassKind::from_supertype(&super_class),
            source,
        });
    }
    classes
}

/// Builds the generation record for a reply, or `None` when the reply does
/// not contain any recognizable class definition.
pub fn extract_generation(user_message: &str, reply: &str) -> Option<Generation> {
    if !contains_code(reply) {
        return None;
    }
    let classes = extract_classes(reply);
    if classes.is_empty() {
        return None;
    }
    let snippet: String = user_message.chars().take(100).collect();
    Some(Generation {
        description: format!("Generated {} class(es) for: {snippet}", classes.len()),
        classes,
    })
}

#[cfg(test)]
mod tests {
    use super::{contains_code, extract_classes, extract_generation, ClassKind};

    const OPERATION_CLASS: &str = "Class Trestle.Generated.Billing.BusinessOperation.ExportSender Extends Engine.BusinessOperation\n{\nProperty TargetUrl As %String;\n}";
    const MESSAGE_CLASS: &str =
        "Class Trestle.Generated.Billing.Message.ExportRequest Extends Engine.Request\n{\n}";

    #[test]
    fn detects_code_by_keyword_triplet() {
        assert!(contains_code(OPERATION_CLASS));
        assert!(!contains_code("Just prose about a Class design."));
        assert!(!contains_code("Class Foo has no body"));
    }

    #[test]
    fn extracts_multiple_classes_with_taxonomy() {
        let reply = format!("Here is the integration:\n\n{OPERATION_CLASS}\n\n{MESSAGE_CLASS}\n");
        let classes = extract_classes(&reply);

        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].class_name, "Trestle.Generated.Billing.BusinessOperation.ExportSender");
        assert_eq!(classes[0].class_type, ClassKind::BusinessOperation);
        assert!(classes[0].source.starts_with("Class "));
        assert!(classes[0].source.ends_with('}'));
        assert_eq!(classes[1].class_type, ClassKind::Message);
    }

    #[test]
    fn classifies_supertypes_by_substring() {
        let cases = [
            ("Engine.BusinessService", ClassKind::BusinessService),
            ("Engine.TCPService.Framed", ClassKind::BusinessService),
            ("Engine.BusinessProcess", ClassKind::BusinessProcess),
            ("Engine.DataTransform", ClassKind::Transform),
            ("Engine.Rule.Definition", ClassKind::RoutingRule),
            ("%Persistent", ClassKind::Message),
            ("Engine.TestCase", ClassKind::Test),
            ("Some.Base", ClassKind::Other),
        ];
        for (super_class, expected) in cases {
            let source = format!("Class Demo.One Extends {super_class}\n{{\n}}");
            let classes = extract_classes(&source);
            assert_eq!(classes.len(), 1, "no class extracted for {super_class}");
            assert_eq!(classes[0].class_type, expected, "wrong kind for {super_class}");
        }
    }

    #[test]
    fn accepts_bracketed_class_annotations() {
        let source = "Class Demo.Audit Extends %Persistent [ Abstract ]\n{\n}";
        let classes = extract_classes(source);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].class_name, "Demo.Audit");
        assert_eq!(classes[0].class_type, ClassKind::Message);
    }

    #[test]
    fn generation_description_truncates_the_request() {
        let long_request = "build an outbound billing export that ".repeat(5);
        let generation = extract_generation(&long_request, OPERATION_CLASS).unwrap();

        assert_eq!(generation.classes.len(), 1);
        assert!(generation.description.starts_with("Generated 1 class(es) for: "));
        let snippet = generation.description.trim_start_matches("Generated 1 class(es) for: ");
        assert_eq!(snippet.chars().count(), 100);
    }

    #[test]
    fn prose_without_class_blocks_yields_no_generation() {
        assert!(extract_generation("hello", "A Class that Extends nothing useful { }").is_none());
        assert!(extract_generation("hello", "plain answer").is_none());
    }
}
