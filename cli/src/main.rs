use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lms_client::guard::{self, GuardDecision, Route};
use lms_client::net::api;
use lms_client::net::types::{CourseUpdate, Role};
use lms_client::pages::courses::{CourseDetailsPage, CoursesPage};
use lms_client::pages::dashboard::{DashboardPage, NewCategoryForm, NewCourseForm};
use lms_client::pages::login::LoginForm;
use lms_client::pages::password::ResetForm;
use lms_client::pages::profile::{ProfileForm, ProfilePage};
use lms_client::pages::register::RegisterForm;
use lms_client::pages::{login, password, register};
use lms_client::{ClientConfig, ClientError, LmsClient};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("sign in required to open {0}; run `lms-cli login` first")]
    LoginRequired(String),
    #[error("your role cannot open {0}")]
    Forbidden(String),
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "lms-cli", about = "Command-line client for the LMS REST API")]
struct Cli {
    /// API root; overrides the configured default.
    #[arg(long, env = "LMS_API_BASE_URL")]
    base_url: Option<String>,

    /// Where the session tokens are stored between runs.
    #[arg(long, env = "LMS_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Log every request to stderr.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-validate the stored session and print the signed-in user.
    Whoami,
    Login {
        /// Email address or username.
        identifier: String,
        #[arg(long, env = "LMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register(RegisterArgs),
    Logout,
    ForgotPassword {
        email: String,
    },
    ResetPassword {
        /// Reset token, or the full link from the reset email.
        token: String,
        #[arg(long, env = "LMS_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Profile(ProfileCommand),
    Course(CourseCommand),
    Category(CategoryCommand),
    /// Enroll the signed-in user in a course.
    Enroll {
        course_id: i64,
    },
    Enrollment(EnrollmentCommand),
    /// Admin dashboard summary and widgets.
    Dashboard,
    /// List instructors (admin only).
    Instructors,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long, env = "LMS_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    role: Option<Role>,
    #[arg(long)]
    phone: Option<String>,
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Update {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        /// Pass an empty string to clear.
        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CourseCommand {
    #[command(subcommand)]
    command: CourseSubcommand,
}

#[derive(Subcommand, Debug)]
enum CourseSubcommand {
    List {
        /// Case-insensitive filter on title and description.
        #[arg(long, default_value = "")]
        search: String,
    },
    Show {
        course_id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        category: Option<i64>,
        /// Required for admins; instructors always own their courses.
        #[arg(long)]
        instructor: Option<i64>,
    },
    Update {
        course_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        instructor: Option<i64>,
    },
    Delete {
        course_id: i64,
    },
}

#[derive(Args, Debug)]
struct CategoryCommand {
    #[command(subcommand)]
    command: CategorySubcommand,
}

#[derive(Subcommand, Debug)]
enum CategorySubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Args, Debug)]
struct EnrollmentCommand {
    #[command(subcommand)]
    command: EnrollmentSubcommand,
}

#[derive(Subcommand, Debug)]
enum EnrollmentSubcommand {
    List,
    Delete { enrollment_id: i64 },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
    if let Err(error) = dotenvy::dotenv() {
        tracing::debug!(%error, "no .env loaded");
    }

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    if let Some(token_file) = cli.token_file {
        config = config.with_token_file(token_file);
    }
    tracing::debug!(base_url = %config.base_url, token_file = %config.token_file.display(), "cli config");

    let client = LmsClient::with_token_file(&config)?;
    run(&client, cli.command).await
}

async fn run(client: &LmsClient, command: Command) -> Result<(), CliError> {
    match command {
        Command::Whoami => {
            open(client, Route::Profile).await?;
            let user = client.session().current_user();
            print_json(&user)
        }
        Command::Login { identifier, password } => {
            let session = login::submit(client, &LoginForm { identifier, password }).await?;
            print_json(&session.user)
        }
        Command::Register(args) => run_register(client, args).await,
        Command::Logout => {
            client.logout().await;
            print_json(&json!({ "message": "Logged out" }))
        }
        Command::ForgotPassword { email } => {
            let message = password::forgot_password(client, &email).await?;
            print_json(&json!({ "message": message }))
        }
        Command::ResetPassword { token, password } => {
            let form = ResetForm { token, new_password: password };
            let message = password::reset_password(client, &form).await?;
            print_json(&json!({ "message": message }))
        }
        Command::Profile(profile) => run_profile(client, profile).await,
        Command::Course(course) => run_course(client, course).await,
        Command::Category(category) => run_category(client, category).await,
        Command::Enroll { course_id } => {
            open(client, Route::CourseDetails(course_id)).await?;
            let page = CoursesPage::new(client.clone());
            page.mount().await;
            let enrollment = page.enroll(course_id).await?;
            print_json(&enrollment)
        }
        Command::Enrollment(enrollment) => run_enrollment(client, enrollment).await,
        Command::Dashboard => {
            open(client, Route::Dashboard).await?;
            let data = DashboardPage::new(client.clone()).load().await?;
            print_json(&json!({
                "summary": data.summary,
                "courses": data.courses,
                "categories": data.categories,
                "instructors": data.instructors,
                "enrollments": data.enrollments,
                "warnings": data.warnings,
            }))
        }
        Command::Instructors => {
            open(client, Route::Dashboard).await?;
            let instructors = api::instructors(client.http()).await?;
            print_json(&instructors)
        }
    }
}

async fn run_register(client: &LmsClient, args: RegisterArgs) -> Result<(), CliError> {
    let form = RegisterForm {
        username: args.username,
        email: args.email,
        first_name: args.first_name,
        last_name: args.last_name,
        password: args.password,
        role: args.role,
        phone: args.phone,
    };
    let session = register::submit(client, &form).await?;
    print_json(&session.user)
}

async fn run_profile(client: &LmsClient, profile: ProfileCommand) -> Result<(), CliError> {
    open(client, Route::Profile).await?;
    let page = ProfilePage::new(client.clone());
    match profile.command {
        ProfileSubcommand::Show => print_json(&page.load().await?),
        ProfileSubcommand::Update { email, first_name, last_name, phone } => {
            let form = ProfileForm { email, first_name, last_name, phone };
            print_json(&page.save(&form).await?)
        }
    }
}

async fn run_course(client: &LmsClient, course: CourseCommand) -> Result<(), CliError> {
    match course.command {
        CourseSubcommand::List { search } => {
            open(client, Route::Courses).await?;
            let page = CoursesPage::new(client.clone());
            page.refresh_courses().await?;
            print_json(&page.visible(&search))
        }
        CourseSubcommand::Show { course_id } => {
            open(client, Route::CourseDetails(course_id)).await?;
            let course = CourseDetailsPage::new(client.clone(), course_id).mount().await?;
            print_json(&course)
        }
        CourseSubcommand::Create { title, description, category, instructor } => {
            open(client, Route::NewCourse).await?;
            let form = NewCourseForm { title, description, category, instructor };
            let course = DashboardPage::new(client.clone()).create_course(&form).await?;
            print_json(&course)
        }
        CourseSubcommand::Update { course_id, title, description, category, instructor } => {
            open(client, Route::NewCourse).await?;
            let update = CourseUpdate { title, description, category, instructor };
            let course = CoursesPage::new(client.clone()).update_course(course_id, &update).await?;
            print_json(&course)
        }
        CourseSubcommand::Delete { course_id } => {
            open(client, Route::NewCourse).await?;
            CoursesPage::new(client.clone()).delete_course(course_id).await?;
            print_json(&json!({ "deleted": course_id }))
        }
    }
}

async fn run_category(client: &LmsClient, category: CategoryCommand) -> Result<(), CliError> {
    match category.command {
        CategorySubcommand::List => {
            open(client, Route::Courses).await?;
            print_json(&api::categories(client.http()).await?)
        }
        CategorySubcommand::Create { name, description } => {
            open(client, Route::Dashboard).await?;
            let form = NewCategoryForm { name, description };
            let created = DashboardPage::new(client.clone()).create_category(&form).await?;
            print_json(&created)
        }
    }
}

async fn run_enrollment(client: &LmsClient, enrollment: EnrollmentCommand) -> Result<(), CliError> {
    open(client, Route::Courses).await?;
    let page = CoursesPage::new(client.clone());
    match enrollment.command {
        EnrollmentSubcommand::List => print_json(&page.refresh_enrollments().await?),
        EnrollmentSubcommand::Delete { enrollment_id } => {
            page.unenroll(enrollment_id).await?;
            print_json(&json!({ "deleted": enrollment_id }))
        }
    }
}

/// Re-validate the stored session, then run the route guard for `route`.
async fn open(client: &LmsClient, route: Route) -> Result<(), CliError> {
    client.refresh().await;
    match guard::decide(&client.auth_state(), route) {
        GuardDecision::Render => Ok(()),
        GuardDecision::RedirectLogin { from } => Err(CliError::LoginRequired(from)),
        GuardDecision::Wait => Err(CliError::LoginRequired(route.path())),
        GuardDecision::RedirectHome => Err(CliError::Forbidden(route.path())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
