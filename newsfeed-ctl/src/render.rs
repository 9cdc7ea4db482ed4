use newsfeed_api::{Comment, News};
use newsfeed_client::{CommentTree, InteractionState};

const INDENT: &str = "  ";

pub fn news_line(news: &News) -> String {
    let category = news
        .primary_category()
        .map(|c| format!("[{c}] "))
        .unwrap_or_default();
    format!(
        "{} {}{} ({} likes, {} comments)",
        news.id, category, news.title, news.likes_count, news.comments_count
    )
}

pub fn interactions(state: &InteractionState) -> String {
    let mark = |set: bool| match set {
        true => "x",
        false => " ",
    };
    format!(
        "[{}] liked ({} likes)  [{}] bookmarked",
        mark(state.liked),
        state.like_count,
        mark(state.bookmarked)
    )
}

/// Renders a comment thread, one comment per line, replies indented below
/// their parent
pub fn thread(tree: &CommentTree, name: impl Fn(&Comment) -> String) -> String {
    let mut res = String::new();
    for (depth, c) in tree.flatten() {
        let edited = match c.is_edited() {
            true => " (edited)",
            false => "",
        };
        res.push_str(&format!(
            "{}{} {} {}{}: {}\n",
            INDENT.repeat(depth),
            c.id,
            name(c),
            c.created_at.format("%b %-d, %Y"),
            edited,
            c.content
        ));
    }
    res
}
