//! The `pixelgrade init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("pixelgrade.toml").exists() {
        println!("pixelgrade.toml already exists, skipping.");
    } else {
        std::fs::write("pixelgrade.toml", SAMPLE_CONFIG)?;
        println!("Created pixelgrade.toml");
    }

    std::fs::create_dir_all("challenges")?;
    let example_path = Path::new("challenges/example.toml");
    if example_path.exists() {
        println!("challenges/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CHALLENGE)?;
        println!("Created challenges/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: pixelgrade validate --challenge challenges/example.toml");
    println!("  2. Run: pixelgrade evaluate --challenge challenges/example.toml --candidate <dir>");
    println!("  3. Run: pixelgrade worker, then pixelgrade submit --challenge-id product-card --candidate <dir>");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# pixelgrade configuration

[store]
type = "fs"
root = "./pixelgrade-data"
challenges_dir = "./challenges"

# Remote queue service:
# [store]
# type = "http"
# base_url = "https://grading.example.com/api"
# api_token = "${PIXELGRADE_API_TOKEN}"

[worker]
poll_interval_ms = 2000
max_concurrent = 2

[render]
timeout_secs = 30
settle_ms = 250
artifacts_dir = "./pixelgrade-data/screenshots"
"#;

const EXAMPLE_CHALLENGE: &str = r#"[challenge]
id = "product-card"
name = "Product card"
description = "Build a product card with an image, a title, a price and a buy button."

[challenge.passing_threshold]
structure = 70
visual = 70
overall = 70

[expected]
html = """
<div class="product-card">
  <img class="product-image" src="headphones.png" alt="Wireless headphones">
  <h2 class="product-title">Wireless Headphones</h2>
  <p class="product-description">Noise cancelling, 30 hour battery.</p>
  <span class="product-price">$99.99</span>
  <button class="buy-button">Add to cart</button>
</div>
"""
css = """
.product-card { width: 280px; padding: 16px; border: 1px solid #ddd; border-radius: 8px; }
.product-image { width: 100%; }
.product-price { color: #b12704; font-weight: bold; }
.buy-button { background: #ffd814; border: none; padding: 8px 16px; }
"""
"#;
