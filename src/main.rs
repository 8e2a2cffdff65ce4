use std::env;
use std::io::Write;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use fridge_chef::culinary::categorize_ingredient;
use fridge_chef::{FridgeChef, ImageSource, StreamChunk};

const USAGE: &str = "Usage:
  fridge-chef scan <image>... [--stream]
  fridge-chef detect <image>...
  fridge-chef from-name <name> <ingredient>...
  fridge-chef ideas <ingredient>...
  fridge-chef recommend <ingredient>...
  fridge-chef categorize <ingredient>...

Provider settings come from fridge-chef.toml and FRIDGE_CHEF__* variables.
Set FRIDGE_CHEF_DATA to keep generated recipes in a directory.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (command, rest) = args.split_first().ok_or(USAGE)?;

    // categorize is offline; everything else needs a provider
    if command == "categorize" {
        for name in rest {
            println!("{}\t{}", name, categorize_ingredient(name));
        }
        return Ok(());
    }

    let mut builder = FridgeChef::builder();
    if let Ok(dir) = env::var("FRIDGE_CHEF_DATA") {
        builder = builder.data_dir(dir);
    }
    let chef = builder.build()?;
    let cancel = CancellationToken::new();

    match command.as_str() {
        "scan" => {
            let stream = rest.iter().any(|a| a == "--stream");
            let images: Vec<ImageSource> = rest
                .iter()
                .filter(|a| !a.starts_with("--"))
                .map(ImageSource::path)
                .collect();
            if images.is_empty() {
                return Err(USAGE.into());
            }

            chef.start_scan(images);
            let result = if stream {
                let mut on_chunk = |chunk: StreamChunk| {
                    if !chunk.is_complete {
                        eprint!("{}", chunk.content);
                        let _ = std::io::stderr().flush();
                    }
                };
                chef.confirm_and_generate_streaming(&mut on_chunk).await
            } else {
                chef.confirm_and_generate().await
            };

            match result {
                Ok(recipe) => {
                    info!("Generated '{}'", recipe.title);
                    println!("{}", serde_json::to_string_pretty(&recipe)?);
                }
                Err(e) => {
                    if let fridge_chef::ChefError::Scan(scan) = &e {
                        error!("{}", scan.user_message());
                    }
                    return Err(e.into());
                }
            }
        }
        "detect" => {
            let images: Vec<ImageSource> = rest.iter().map(ImageSource::path).collect();
            for name in chef.detect_ingredients(&images, &cancel).await {
                println!("{}", name);
            }
        }
        "from-name" => {
            let (name, available) = rest.split_first().ok_or(USAGE)?;
            let options = chef.settings().get().prompt_options();
            let result = chef
                .client()
                .generate_recipe_from_name(name, available, &options, &cancel)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "ideas" => {
            for idea in chef.client().generate_recipe_ideas(rest, 5, &cancel).await? {
                println!("{}", idea);
            }
        }
        "recommend" => {
            let recommendations = chef.client().recommend_ingredients(rest, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&recommendations)?);
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}
