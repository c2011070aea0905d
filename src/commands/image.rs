//! Image command - upload, analyze, list and delete a tenant's images.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::context::{self, Models};
use super::docs::truncate;
use crate::governance::UploadImageRequest;
use crate::local::ListQuery;

#[derive(Args)]
pub struct ImageCmd {
    #[command(subcommand)]
    pub command: ImageSubCmd,
}

#[derive(Subcommand)]
pub enum ImageSubCmd {
    /// Upload an image and index what it shows
    Upload(ImageUploadCmd),

    /// Re-run OCR and description on a stored image
    Analyze(ImageIdArg),

    /// List images
    List(ImageListCmd),

    /// Delete an image, its blob and its knowledge
    Delete(ImageIdArg),
}

#[derive(Args)]
pub struct ImageUploadCmd {
    /// Image file (JPEG, PNG, GIF or WebP, at most 10 MB)
    pub file: PathBuf,

    /// Title (default: file name)
    #[arg(short, long)]
    pub title: Option<String>,

    /// Tag, repeatable
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Extra context indexed with the image
    #[arg(long)]
    pub context: Option<String>,

    /// Skip text extraction
    #[arg(long)]
    pub no_ocr: bool,
}

#[derive(Args)]
pub struct ImageIdArg {
    /// Image id
    pub id: String,
}

#[derive(Args)]
pub struct ImageListCmd {
    /// Page size (1-100)
    #[arg(short, long, default_value = "20")]
    pub limit: u32,

    #[arg(long, default_value = "0")]
    pub offset: u32,

    /// Title substring
    #[arg(short, long)]
    pub search: Option<String>,

    /// Only images with this tag
    #[arg(long)]
    pub tag: Option<String>,
}

impl ImageCmd {
    pub async fn run(&self, tenant: Option<&str>) -> Result<()> {
        let tenant = context::tenant(tenant)?;

        match &self.command {
            ImageSubCmd::Upload(cmd) => cmd.run(tenant).await,
            ImageSubCmd::Analyze(arg) => {
                let governance = context::open_governance(Models::Required).await?;
                let response = governance
                    .analyze_image(tenant, &arg.id)
                    .await
                    .map_err(context::report)?;

                println!("Image {}", response.image_id);
                println!("  description: {}", response.description);
                println!("  labels:      {}", response.labels.join(", "));
                println!("  confidence:  {:.2}", response.confidence);
                if !response.ocr_text.is_empty() {
                    println!("  text:");
                    for line in response.ocr_text.lines() {
                        println!("    {}", line);
                    }
                }
                Ok(())
            }
            ImageSubCmd::List(cmd) => {
                let governance = context::open_governance(Models::Unused).await?;
                let query = ListQuery {
                    limit: cmd.limit,
                    offset: cmd.offset,
                    search: cmd.search.clone(),
                    tag: cmd.tag.clone(),
                    ..Default::default()
                };
                let page = governance
                    .list_images(tenant, &query)
                    .await
                    .map_err(context::report)?;

                if page.items.is_empty() {
                    println!("No images.");
                    return Ok(());
                }

                println!("{:<18} {:<30} {:>10}  tags", "id", "title", "MB");
                for image in &page.items {
                    println!(
                        "{:<18} {:<30} {:>10.4}  {}",
                        image.id,
                        truncate(&image.title, 30),
                        image.size_mb(),
                        image.tags().join(", ")
                    );
                }
                println!();
                println!("{} of {} images", page.items.len(), page.total);
                Ok(())
            }
            ImageSubCmd::Delete(arg) => {
                let governance = context::open_governance(Models::Unused).await?;
                let row = governance
                    .delete_image(tenant, &arg.id)
                    .await
                    .map_err(context::report)?;
                println!("Deleted image \"{}\" ({})", row.title, row.id);
                Ok(())
            }
        }
    }
}

impl ImageUploadCmd {
    async fn run(&self, tenant: &str) -> Result<()> {
        let bytes = tokio::fs::read(&self.file)
            .await
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let filename = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let governance = context::open_governance(Models::Required).await?;
        let response = governance
            .upload_image(
                tenant,
                UploadImageRequest {
                    title: self.title.clone().unwrap_or_default(),
                    filename,
                    bytes,
                    tags: self.tags.clone(),
                    context: self.context.clone(),
                    extract_text: !self.no_ocr,
                },
            )
            .await
            .map_err(context::report)?;

        println!(
            "Uploaded \"{}\" as {} ({:.2} MB, {} vectors)",
            response.title, response.image_id, response.size_mb, response.vector_count
        );
        println!("  description: {}", response.description);
        if !response.labels.is_empty() {
            println!("  labels:      {}", response.labels.join(", "));
        }
        if !response.ocr_text.is_empty() {
            println!("  text:        {}", response.ocr_text.replace('\n', " / "));
        }
        for overage in &response.overages {
            println!(
                "warning: {} is now {} of {}",
                overage.dimension,
                overage.dimension.format_amount(overage.current),
                overage.limit
            );
        }

        Ok(())
    }
}
