//! Build and print the data namespace

use anyhow::Result;

use crate::Site;

pub async fn run(site: &Site) -> Result<()> {
    let namespace = site.load_data().await?;
    println!("{}", serde_json::to_string_pretty(&*namespace)?);
    Ok(())
}
