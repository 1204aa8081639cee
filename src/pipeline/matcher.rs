//! Header matcher: headers and rule set to tag delta.

use crate::pipeline::headers::HeaderView;
use crate::pipeline::rules::RuleSet;

/// Build the tag delta for one message.
///
/// Every rule whose pattern matches its header contributes `" " + tags`,
/// in rule order. Missing headers are matched as the empty string.
pub fn match_headers(headers: &HeaderView, rules: &RuleSet) -> String {
    let mut delta = String::new();
    for rule in rules.iter() {
        if rule.matches(headers.get(&rule.field)) {
            delta.push(' ');
            delta.push_str(&rule.tags);
        }
    }
    delta
}
