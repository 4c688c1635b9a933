// builtin.rs — The default sensitivity rule set.
//
// These seven rules ship with every deployment and are evaluated before any
// operator-configured rules. Ids are stable: audit entries and operator
// tooling refer to them.

use crate::action::RuleAction;
use crate::predicate::{CHECKOUT_FLOW_URL, EMAIL_COMPOSE_URL};
use crate::rule::SensitivityRule;

/// Tool name of the agent's web browser.
pub const BROWSER_TOOL: &str = "browser";

/// Tool name for sending a chat/channel message.
pub const MESSAGE_SEND_TOOL: &str = "message_send";

/// File deletion commands across POSIX shells and PowerShell/cmd.
const DESTRUCTIVE_FILE_PATTERNS: &[&str] = &[
    r"\brm\s",
    r"\brmdir\s",
    r"\bshred\s",
    r"\bdel\s",
    r"Remove-Item",
];

/// Privilege escalation, remote code execution, disk and power operations.
const DANGEROUS_SYSTEM_PATTERNS: &[&str] = &[
    r"\bsudo\s",
    r"\bcurl\b.*\|\s*(sudo\s+)?(ba|z|da)?sh\b",
    r"\bdd\s+if=",
    r"\bshutdown\b",
    r"\breboot\b",
    r"\bmkfs\b",
    // Any bare word `format`, including behind `cmd /c` or `powershell`;
    // a leading `-` marks an option such as `ls --format long`.
    r"(^|[^-\w])format\s",
    r"\bnewfs\b",
];

/// The built-in rules, in evaluation order.
pub fn builtin_rules() -> Vec<SensitivityRule> {
    vec![
        SensitivityRule::new(
            "financial-sites",
            "Financial site navigation",
            "financial",
            RuleAction::RequireApproval,
        )
        .with_description("Browsing banking, brokerage or payment sites needs a human in the loop")
        .with_tools(&[BROWSER_TOOL])
        .with_domain_categories(&["financial"]),
        SensitivityRule::new(
            "shopping-checkout",
            "Shopping checkout flow",
            "shopping",
            RuleAction::Block,
        )
        .with_description("Typing or clicking inside a checkout, payment, cart or order flow")
        .with_tools(&[BROWSER_TOOL])
        .with_domain_categories(&["shopping"])
        .with_browser_actions(&["type", "click"])
        .with_predicate(CHECKOUT_FLOW_URL),
        SensitivityRule::new(
            "email-send",
            "Email compose and send",
            "communication",
            RuleAction::RequireApproval,
        )
        .with_description("Composing, sending, replying to or forwarding email from a webmail client")
        .with_tools(&[BROWSER_TOOL])
        .with_domain_categories(&["email"])
        .with_browser_actions(&["click", "type"])
        .with_predicate(EMAIL_COMPOSE_URL),
        SensitivityRule::new(
            "message-send",
            "Outbound messages",
            "communication",
            RuleAction::RequireApproval,
        )
        .with_description("Any message sent on the agent's behalf")
        .with_tools(&[MESSAGE_SEND_TOOL]),
        SensitivityRule::new(
            "destructive-file-ops",
            "Destructive file deletion",
            "filesystem",
            RuleAction::RequireApproval,
        )
        .with_description("Shell commands that delete files or directories")
        .with_command_patterns(DESTRUCTIVE_FILE_PATTERNS),
        SensitivityRule::new(
            "dangerous-system-commands",
            "Dangerous system commands",
            "system",
            RuleAction::Block,
        )
        .with_description(
            "Privilege escalation, piping downloads into a shell, raw disk writes, power control",
        )
        .with_command_patterns(DANGEROUS_SYSTEM_PATTERNS),
        SensitivityRule::new(
            "cloud-admin-consoles",
            "Cloud admin console navigation",
            "admin",
            RuleAction::RequireApproval,
        )
        .with_description("Navigating cloud provider or SaaS administration consoles")
        .with_tools(&[BROWSER_TOOL])
        .with_domain_categories(&["admin"]),
    ]
}
