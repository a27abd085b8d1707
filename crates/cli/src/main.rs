use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tasktalk::config;
use tasktalk::models::{ConversationId, Role, Task, TaskUpdate};
use tasktalk::session::SessionEvent;
use tasktalk::tasks::TaskFilter;
use tasktalk::{AuthError, Client, ClientError};

#[derive(Parser)]
#[command(name = "tasktalk")]
#[command(about = "Manage tasks directly or through natural-language chat", long_about = None)]
struct Cli {
    /// Config file path (default: TASKTALK_CONFIG_PATH or ~/.tasktalk/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init,

    /// Log in and store the access token.
    Login {
        username: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account, then log in with it.
    Register {
        email: String,
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, value_name = "NAME")]
        full_name: Option<String>,
    },

    /// Forget the stored access token.
    Logout,

    /// Show the API base URL and whether a token is stored.
    Status,

    /// List and edit tasks.
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Chat with the assistant (interactive). Commands: /clear, /list, /open ID, /delete ID, /exit.
    Chat {
        /// Continue an existing conversation.
        #[arg(long, value_name = "ID")]
        conversation: Option<i64>,
    },

    /// Browse persisted conversations.
    Conversations {
        #[command(subcommand)]
        command: ConversationCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks (all, active, completed).
    List {
        #[arg(long, short, default_value = "all")]
        filter: TaskFilter,
    },
    /// Add a task.
    Add {
        title: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// Change title and/or description.
    Edit {
        id: i64,
        #[arg(long, short)]
        title: Option<String>,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// Mark a task completed.
    Done { id: i64 },
    /// Mark a task not completed.
    Undo { id: i64 },
    /// Flip completion.
    Toggle { id: i64 },
    /// Delete a task (asks first unless --yes).
    Rm {
        id: i64,
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConversationCommands {
    List,
    /// Print a conversation's messages.
    Show { id: i64 },
    Rm { id: i64 },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("tasktalk {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init) => run_init(cli.config),
        Some(Commands::Login { username, password }) => {
            run_login(cli.config, username, password).await
        }
        Some(Commands::Register {
            email,
            username,
            password,
            full_name,
        }) => run_register(cli.config, email, username, password, full_name).await,
        Some(Commands::Logout) => run_logout(cli.config),
        Some(Commands::Status) => run_status(cli.config),
        Some(Commands::Tasks { command }) => run_tasks(cli.config, command).await,
        Some(Commands::Chat { conversation }) => run_chat(cli.config, conversation).await,
        Some(Commands::Conversations { command }) => {
            run_conversations(cli.config, command).await
        }
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        if e
            .downcast_ref::<ClientError>()
            .is_some_and(|e| e.is_expired())
            || matches!(
                e.downcast_ref::<AuthError>(),
                Some(AuthError::Expired | AuthError::NotAuthenticated)
            )
        {
            eprintln!("run `tasktalk login <username>` to sign in");
        }
        std::process::exit(1);
    }
}

fn open_client(config_path: Option<PathBuf>) -> anyhow::Result<Client> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("api base url: {}", config::resolve_base_url(&config));
    Ok(Client::from_config(&config, &path)?)
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = config::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn read_password(given: Option<String>) -> anyhow::Result<String> {
    if let Some(p) = given {
        return Ok(p);
    }
    eprint!("password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_login(
    config_path: Option<PathBuf>,
    username: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    let client = open_client(config_path)?;
    let password = read_password(password)?;
    client.session().login(&username, &password).await?;
    println!("logged in as {}", username.trim());
    Ok(())
}

async fn run_register(
    config_path: Option<PathBuf>,
    email: String,
    username: String,
    password: Option<String>,
    full_name: Option<String>,
) -> anyhow::Result<()> {
    let client = open_client(config_path)?;
    let password = read_password(password)?;
    client
        .session()
        .register(&email, &username, &password, full_name.as_deref())
        .await?;
    println!("registered and logged in as {}", username.trim());
    Ok(())
}

fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = open_client(config_path)?;
    client.session().logout();
    println!("logged out");
    Ok(())
}

fn run_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (cfg, path) = config::load_config(config_path)?;
    println!("config: {}", path.display());
    println!("api: {}", config::resolve_base_url(&cfg));
    let client = Client::from_config(&cfg, &path)?;
    if client.session().is_authenticated() {
        println!("session: logged in");
    } else {
        println!("session: not logged in");
    }
    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    match task.description.as_deref() {
        Some(d) => println!("[{}] {:>4}  {}  ({})", mark, task.id, task.title, d),
        None => println!("[{}] {:>4}  {}", mark, task.id, task.title),
    }
}

fn ask_yes_no(prompt: &str) -> bool {
    eprint!("{} [y/N] ", prompt);
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn run_tasks(config_path: Option<PathBuf>, command: TaskCommands) -> anyhow::Result<()> {
    let client = open_client(config_path)?;
    let mut tasks = client.tasks();
    match command {
        TaskCommands::List { filter } => {
            let visible = tasks.list(filter).await?;
            if visible.is_empty() {
                println!("no tasks");
            }
            for t in &visible {
                print_task(t);
            }
            let c = tasks.counts();
            println!("{} total, {} active, {} completed", c.all, c.active, c.completed);
        }
        TaskCommands::Add { title, description } => {
            let task = tasks.create(&title, description.as_deref()).await?;
            print_task(&task);
        }
        TaskCommands::Edit {
            id,
            title,
            description,
        } => {
            let task = tasks
                .update(
                    id,
                    TaskUpdate {
                        title,
                        description,
                        completed: None,
                    },
                )
                .await?;
            print_task(&task);
        }
        TaskCommands::Done { id } => print_task(&tasks.set_completed(id, true).await?),
        TaskCommands::Undo { id } => print_task(&tasks.set_completed(id, false).await?),
        TaskCommands::Toggle { id } => {
            tasks.refresh().await?;
            print_task(&tasks.toggle(id).await?);
        }
        TaskCommands::Rm { id, yes } => {
            if !yes {
                // Snapshot gives the prompt the task's title.
                tasks.refresh().await?;
            }
            let confirm = |prompt: &str| yes || ask_yes_no(prompt);
            if tasks.delete(id, &confirm).await? {
                println!("deleted task {}", id);
            } else {
                println!("kept task {}", id);
            }
        }
    }
    Ok(())
}

async fn run_conversations(
    config_path: Option<PathBuf>,
    command: ConversationCommands,
) -> anyhow::Result<()> {
    let client = open_client(config_path)?;
    let mut chat = client.chat();
    match command {
        ConversationCommands::List => print_conversations(chat.refresh().await?),
        ConversationCommands::Show { id } => {
            chat.select(id).await?;
            for m in chat.transcript().messages() {
                print_message(m.role, &m.content);
            }
        }
        ConversationCommands::Rm { id } => {
            chat.delete(id).await?;
            println!("deleted conversation {}", id);
        }
    }
    Ok(())
}

fn print_conversations(list: &[tasktalk::models::Conversation]) {
    if list.is_empty() {
        println!("no conversations");
    }
    for c in list {
        let when = c
            .updated_at
            .or(c.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:>4}  {:<16}  {}", c.id, when, c.display_title());
    }
}

fn print_message(role: Role, content: &str) {
    match role {
        Role::User => println!("> {}", content.trim()),
        Role::Assistant => println!("< {}", content.trim()),
    }
}

async fn run_chat(config_path: Option<PathBuf>, conversation: Option<i64>) -> anyhow::Result<()> {
    let client = open_client(config_path)?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == SessionEvent::Expired {
                eprintln!("session expired; run `tasktalk login <username>` and start chat again");
            }
        }
    });

    let mut chat = client.chat();
    if let Some(id) = conversation {
        chat.select(id).await?;
        for m in chat.transcript().messages() {
            print_message(m.role, &m.content);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if let Some(cmd) = input.strip_prefix('/') {
            if let Err(e) = chat_command(&mut chat, cmd).await {
                eprintln!("{}", e);
            }
            continue;
        }

        match chat.send(input).await {
            Ok(outcome) => {
                println!("< {}", outcome.reply.content.trim());
                if outcome.adopted {
                    log::info!("chat: conversation {}", outcome.conversation_id);
                }
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
                if e.is_expired() || matches!(e, ClientError::Auth(AuthError::NotAuthenticated)) {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn chat_command(chat: &mut tasktalk::chat::ChatWorkspace, cmd: &str) -> anyhow::Result<()> {
    let mut parts = cmd.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::parse::<i64>).transpose()?;
    match (name, arg) {
        ("clear" | "new", _) => {
            chat.clear();
            println!("(new conversation)");
        }
        ("list", _) => print_conversations(chat.refresh().await?),
        ("open", Some(id)) => {
            chat.select(id).await?;
            for m in chat.transcript().messages() {
                print_message(m.role, &m.content);
            }
        }
        ("delete", Some(id)) => {
            let was_active = chat.active() == ConversationId::Existing(id);
            chat.delete(id).await?;
            println!("deleted conversation {}", id);
            if was_active {
                println!("(new conversation)");
            }
        }
        ("open" | "delete", None) => anyhow::bail!("usage: /{} ID", name),
        _ => anyhow::bail!("unknown command /{}", name),
    }
    Ok(())
}
