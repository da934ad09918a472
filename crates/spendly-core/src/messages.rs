//! Reply copy sent back over WhatsApp
//!
//! WhatsApp renders `*bold*`, so headings use it. Amounts are rupees.

use chrono::Duration;

/// Appended to a success reply now and then
pub const DASHBOARD_TIP: &str =
    "\n\n💡 *Tip:* Type 'dashboard' to see beautiful charts and analytics on the web!";

pub const FIRST_EXPENSE_FOLLOW_UP: &str = "Now, let's process your first expense! 🚀";

pub const COMMAND_FAILED: &str = "❌ Sorry, something went wrong. Please try again.";

pub const GENERAL_ERROR: &str =
    "❌ Oops! Something went wrong. Please try again or contact support.";

pub const IMAGE_REQUIRED: &str = "❌ Please send a clear image of your bill or receipt. I can extract all the details automatically! 📷";

pub const PARSING_ERROR: &str = "❌ *Couldn't understand that expense*

*Try these formats:*
• \"50rs coffee at cafe\"
• \"paid 200 to grocery store\"
• \"300 rupees dinner\"
• Or send a clear bill photo

Need help? Type 'help' 💪";

pub const IMAGE_UNREADABLE: &str = "⚠️ *Couldn't extract expense details*

Your bill has been saved, but I couldn't read the details automatically.

💡 *Try:*
• Sending a clearer photo
• Or tell me manually: \"50rs coffee at cafe\"

I'll keep improving! 🚀";

pub const LOGIN_FAILED: &str = "❌ Failed to generate dashboard link. Please try again later.";

pub fn welcome(is_new_user: bool) -> &'static str {
    if is_new_user {
        "🎉 *Welcome to Spendly!*

Hi there! I'm your personal expense tracking assistant. I'll help you track every rupee you spend effortlessly.

*Here's what I can do:*
📝 *Text tracking:* Send me messages like \"50rs coffee at CCD\" or \"paid 500 to grocery store\"
📷 *Bill scanning:* Send me photos of bills/receipts and I'll extract all details automatically
📊 *Smart categorization:* I'll automatically categorize your expenses
🌐 *Web dashboard:* Type \"dashboard\" for beautiful analytics and charts

*Try it now!* Send me your first expense or a bill photo.

Type 'help' anytime for more options! 💪"
    } else {
        "👋 *Welcome back!*

Ready to track more expenses? Send me:
• A text like \"100rs lunch at office canteen\"
• A photo of your bill/receipt
• Type 'dashboard' for your web analytics
• Type 'help' for all commands"
    }
}

pub fn help() -> &'static str {
    "💸 *Spendly Commands 💸:*

*💰 Expense Tracking:*
• Send text: \"50rs coffee\" or \"paid 200 to uber\"
• Send bill photo for auto-extraction

*📊 Analytics & Reports:*
• `summary` - View your expense summary
• `today` - Today's expenses
• `week` - This week's expenses
• `categories` - Expense breakdown by category
• \"How much did I spend on food this month?\"
• \"Show my total expenses for July\"
• \"Top 3 categories last 7 days\"

*💸 Budget Management:*
• \"Set budget for food as 5000 this month\"
• \"Set travel budget 3000 monthly\"
• `budgets` - List all your budgets
• `budget status` - Check budget usage

*🌐 Web Dashboard:*
• `login` or `dashboard` - Get secure link to web dashboard
• View detailed analytics, charts, and export data

*🔧 Other Commands:*
• `help` - Show this menu

What would you like to track today? 📊"
}

/// What a success reply reports about a recorded expense
#[derive(Debug, Clone)]
pub struct SavedExpense<'a> {
    pub amount: f64,
    pub vendor: Option<&'a str>,
    pub date: Option<&'a str>,
}

pub fn expense_saved(saved: &SavedExpense, from_image: bool, with_tip: bool) -> String {
    let vendor = saved.vendor.unwrap_or("item");
    let date = saved.date.unwrap_or("today");
    let tip = if with_tip { DASHBOARD_TIP } else { "" };
    let amount = format_currency(saved.amount);

    if from_image {
        format!(
            "✅ *Bill processed successfully!*

💰 *Amount:* ₹{amount}
🏪 *Vendor:* {vendor}
📅 *Date:* {date}

Your expense has been saved automatically! 🎉

Send another expense or type 'summary' to see your spending overview.{tip}"
        )
    } else {
        format!(
            "✅ *Expense saved!*

₹{amount} spent at {vendor} on {date}

Keep tracking! Send another expense or type 'help' for more options. 📊{tip}"
        )
    }
}

pub fn rate_limited(reset_in: Option<Duration>) -> String {
    let wait = reset_in
        .map(|d| format!("in {}", format_wait(d)))
        .unwrap_or_else(|| "tomorrow".to_string());
    format!(
        "⛔ *Daily limit reached*

You've used all your messages for today. Your quota resets {wait}.

You can still view everything on the web dashboard. 🌐"
    )
}

pub fn rate_limit_warning(remaining: u32) -> String {
    let plural = if remaining == 1 { "" } else { "s" };
    format!("⚠️ Heads up: you have {remaining} message{plural} left today.")
}

pub fn login_link(link: &str, ttl_minutes: i64) -> String {
    format!(
        "🔐 *Your Spendly dashboard link*

{link}

🔒 The link is valid for {ttl_minutes} minutes
📊 Access your complete expense analytics
💰 View budgets and spending insights"
    )
}

fn format_wait(d: Duration) -> String {
    let minutes = d.num_minutes().max(1);
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Rupee amount with Indian digit grouping and at most two decimals
///
/// `1234567.5` renders as `12,34,567.5`; whole amounts carry no decimals.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;

    let mut out = String::new();
    if amount < 0.0 && cents > 0 {
        out.push('-');
    }
    out.push_str(&group_indian(whole));
    if fraction > 0 {
        out.push('.');
        out.push_str(format!("{:02}", fraction).trim_end_matches('0'));
    }
    out
}

fn group_indian(n: u64) -> String {
    let digits = n.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (mut head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    while head.len() > 2 {
        let (rest, pair) = head.split_at(head.len() - 2);
        groups.push(pair);
        head = rest;
    }
    groups.push(head);
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}
