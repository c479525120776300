mod check;
mod project;

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rable::rable_scene::Document;
use rable::{Environment, Function, Rable, RableOptions, Scope, State, Value};

use project::Project;

#[derive(Parser)]
#[command(name = "rable")]
#[command(about = "Render and check Rable templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a project and print the rendered page
    Render {
        /// Rable.toml or the directory holding it
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Write the page here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Type into a control before printing (`selector=value`, repeatable)
        #[arg(long)]
        input: Vec<String>,

        /// Click an element before printing, after all inputs (repeatable)
        #[arg(long)]
        click: Vec<String>,

        /// Print the root state as JSON after the page
        #[arg(long)]
        state: bool,
    },

    /// Report invalid expressions and loop statements in markup files
    Check {
        /// Pages or component templates
        files: Vec<PathBuf>,
    },

    /// Evaluate an expression against JSON data
    Eval {
        /// The expression to evaluate
        expression: String,

        /// JSON object used as state
        #[arg(long, default_value = "{}")]
        data: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            project,
            output,
            input,
            click,
            state,
        } => {
            let project = Project::load(&project)?;
            let app = mount(&project)?;
            for entry in &input {
                let Some((selector, value)) = entry.split_once('=') else {
                    bail!("--input expects `selector=value`, got '{entry}'");
                };
                let node = find(&app, selector)?;
                app.document().input(node, value);
            }
            for selector in &click {
                let node = find(&app, selector)?;
                app.document().click(node);
            }
            let mut page = app.document().to_html();
            if state {
                let snapshot = serde_json::to_string_pretty(&app.state().snapshot())?;
                page.push('\n');
                page.push_str(&snapshot);
            }
            match output {
                Some(output) => {
                    fs::write(&output, page)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    eprintln!("Rendered to {}", output.display());
                }
                None => println!("{page}"),
            }
        }

        Commands::Check { files } => {
            let mut problems = 0;
            for file in &files {
                let markup = fs::read_to_string(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let found = check::check_markup(&markup, &file.display().to_string());
                for problem in &found {
                    eprintln!("{problem}");
                }
                problems += found.len();
            }
            if problems > 0 {
                bail!("{problems} problem(s) in {} file(s)", files.len());
            }
            eprintln!("{} file(s) ok", files.len());
        }

        Commands::Eval { expression, data } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("--data must be valid JSON")?;
            let state = State::root();
            if let serde_json::Value::Object(data) = data {
                for (key, value) in data {
                    state.write(&rable::Path::parse(&key), value.into());
                }
            }
            let scope: Rc<dyn Scope> = Rc::clone(&state) as _;
            let program = rable::compile(&expression).map_err(|error| {
                anyhow::anyhow!("{}", error.report("expression"))
            })?;
            let result = Environment::new(Rc::clone(&scope), scope).evaluate(&program)?;
            println!("{}", serde_json::to_string(&result.to_json())?);
            println!("{}", serde_json::to_string(&state.snapshot().to_json())?);
        }
    }

    Ok(())
}

/// Build the app for `project` and mount it.
fn mount(project: &Project) -> Result<Rable> {
    let document = Document::parse(&project.page()?);
    let options = RableOptions::default()
        .with_data(project.data()?)
        .with_function(Function::new("open", |call| {
            log::info!("open {}", call.argument(0));
            Ok(Value::Undefined)
        }));
    let app = Rable::new(document, options);
    let loader = project.loader();
    for (name, path) in &project.config.components {
        app.load_component(name, &path.to_string_lossy(), &loader)?;
    }
    if !app.mount(&project.config.mount) {
        bail!("Nothing to mount at '{}'", project.config.mount);
    }
    Ok(app)
}

fn find(app: &Rable, selector: &str) -> Result<rable::rable_scene::NodeId> {
    app.document()
        .query_selector(selector)?
        .with_context(|| format!("No element matches '{selector}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn demo() -> Project {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/downloads");
        Project::load(&root).unwrap()
    }

    #[test]
    fn demo_renders_and_reacts() {
        let app = mount(&demo()).unwrap();
        let document = app.document();
        let links = document.query_selector_all("a.download-link").unwrap();
        let versions: Vec<String> = links
            .iter()
            .map(|link| {
                let text = document.inner_text(*link);
                text.split_whitespace().next().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(versions, ["V3.4.1", "V3.4", "V3.2", "V3.1"]);

        document.click(links[0]);
        assert_eq!(app.state().read(&rable::Path::parse("opened")), Value::from(1));

        document.click(find(&app, "#nav-home").unwrap());
        assert!(!document.is_hidden(find(&app, "#home").unwrap()));
        assert!(document.is_hidden(find(&app, "#downloads").unwrap()));
    }

    #[test]
    fn demo_templates_pass_the_checker() {
        let project = demo();
        let mut files = vec![project.resolve(&project.config.page)];
        files.extend(project.config.components.values().map(|path| project.resolve(path)));
        for file in files {
            let markup = fs::read_to_string(&file).unwrap();
            assert_eq!(check::check_markup(&markup, "demo"), Vec::<String>::new());
        }
    }
}
