use anyhow::Context;
use newsfeed_api::{
    CategoryFilter, CommentId, Credentials, InteractionKind, NewsCategory, NewsId, SignUpMetadata,
    User, Uuid,
};
use newsfeed_client::{ArticleView, Backend, Feed, ProfileView};

mod render;
mod rest;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Base URL of the backend
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List the news, most recent first
    Feed {
        /// Only list news of this category
        #[structopt(short, long)]
        category: Option<NewsCategory>,
    },

    /// Show an article with its comments
    Show { news: Uuid },

    /// Like or unlike an article
    Like { news: Uuid },

    /// Bookmark or unbookmark an article
    Bookmark { news: Uuid },

    /// Record that an article was shared
    Share {
        news: Uuid,

        #[structopt(short, long)]
        platform: Option<String>,
    },

    /// Comment on an article
    Comment {
        news: Uuid,
        text: String,

        /// Comment to reply to
        #[structopt(short, long)]
        reply_to: Option<Uuid>,
    },

    /// Change the text of one of your comments
    EditComment {
        news: Uuid,
        comment: Uuid,
        text: String,
    },

    /// Delete one of your comments
    DeleteComment { news: Uuid, comment: Uuid },

    /// Show your profile and activity
    Profile,

    /// Set your username and full name
    SaveProfile { username: String, full_name: String },

    /// Create an account, with the password taken from the environment
    SignUp {
        email: String,

        #[structopt(short, long)]
        username: Option<String>,
    },
}

fn env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("retrieving {name} environment variable"))
}

fn credentials() -> anyhow::Result<Credentials> {
    Ok(Credentials {
        email: env("NEWSFEED_EMAIL")?,
        password: env("NEWSFEED_PASSWORD")?,
    })
}

async fn sign_in(backend: &Backend) -> anyhow::Result<User> {
    let user = backend
        .auth
        .sign_in(credentials()?)
        .await
        .context("signing in")?;
    Ok(user)
}

/// Signs in if credentials are configured, browses anonymously otherwise
async fn maybe_sign_in(backend: &Backend) -> anyhow::Result<()> {
    if std::env::var_os("NEWSFEED_EMAIL").is_some() {
        sign_in(backend).await?;
    }
    Ok(())
}

async fn open(backend: &Backend, news: Uuid) -> anyhow::Result<ArticleView> {
    let view = ArticleView::new(backend.clone(), NewsId(news));
    view.load()
        .await
        .with_context(|| format!("opening article {news}"))?;
    Ok(view)
}

async fn toggle(backend: &Backend, news: Uuid, kind: InteractionKind) -> anyhow::Result<()> {
    sign_in(backend).await?;
    let view = open(backend, news).await?;
    let state = view
        .interactions()
        .toggle(kind)
        .await
        .with_context(|| format!("toggling {kind}"))?;
    println!("{}", render::interactions(&state));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let rest = rest::Rest::new(opt.host, env("NEWSFEED_API_KEY")?);
    let backend = Backend::from_service(rest);

    match opt.cmd {
        Command::Feed { category } => {
            maybe_sign_in(&backend).await?;
            let filter = category.map_or(CategoryFilter::All, CategoryFilter::Only);
            let mut feed = Feed::new(backend.clone());
            for news in feed.load(filter).await.context("loading feed")? {
                println!("{}", render::news_line(news));
            }
        }
        Command::Show { news } => {
            maybe_sign_in(&backend).await?;
            let view = open(&backend, news).await?;
            if let Some(article) = view.news() {
                println!("{}", render::news_line(&article));
                if let Some(content) = &article.content {
                    println!("\n{content}\n");
                }
            }
            println!("{}", render::interactions(&view.interactions().state()));
            let comments = view.comments();
            print!(
                "{}",
                render::thread(&comments.tree(), |c| comments.display_name(c))
            );
        }
        Command::Like { news } => toggle(&backend, news, InteractionKind::Like).await?,
        Command::Bookmark { news } => toggle(&backend, news, InteractionKind::Bookmark).await?,
        Command::Share { news, platform } => {
            maybe_sign_in(&backend).await?;
            let view = open(&backend, news).await?;
            view.share(platform).await;
        }
        Command::Comment {
            news,
            text,
            reply_to,
        } => {
            sign_in(&backend).await?;
            let view = open(&backend, news).await?;
            let comment = view
                .comments()
                .submit(&text, reply_to.map(CommentId))
                .await
                .context("posting comment")?;
            println!("{}", comment.id);
        }
        Command::EditComment {
            news,
            comment,
            text,
        } => {
            sign_in(&backend).await?;
            let view = open(&backend, news).await?;
            view.comments()
                .edit(CommentId(comment), &text)
                .await
                .context("editing comment")?;
        }
        Command::DeleteComment { news, comment } => {
            sign_in(&backend).await?;
            let view = open(&backend, news).await?;
            view.comments()
                .delete(CommentId(comment))
                .await
                .context("deleting comment")?;
        }
        Command::Profile => {
            sign_in(&backend).await?;
            let view = ProfileView::load(backend.clone())
                .await
                .context("loading profile")?;
            println!("{} ({})", view.display_name(), view.user.email);
            for (title, list) in [("Liked", &view.liked), ("Bookmarked", &view.bookmarked)] {
                println!("\n{title}:");
                for news in list {
                    println!("  {}", render::news_line(news));
                }
            }
            println!("\nComments:");
            for c in &view.comments {
                let on = c.news.as_ref().map_or("(deleted article)", |n| n.title.as_str());
                println!("  {on}: {}", c.comment.content);
            }
        }
        Command::SaveProfile {
            username,
            full_name,
        } => {
            sign_in(&backend).await?;
            let mut view = ProfileView::load(backend.clone())
                .await
                .context("loading profile")?;
            view.save(&username, &full_name)
                .await
                .context("saving profile")?;
        }
        Command::SignUp { email, username } => {
            let credentials = Credentials {
                email,
                password: env("NEWSFEED_PASSWORD")?,
            };
            backend
                .auth
                .sign_up(
                    credentials,
                    SignUpMetadata {
                        username,
                        avatar_url: None,
                    },
                )
                .await
                .context("signing up")?;
            println!("check your inbox to confirm the account");
        }
    }

    Ok(())
}
