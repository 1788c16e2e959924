//! CLI command: `densex ask`

use anyhow::Context;

/// Answer one question and print the reply
pub async fn run(question: &str) -> anyhow::Result<()> {
    let (_, components) = crate::server::init().await?;

    let reply = components
        .pipeline
        .handle_message(question)
        .await
        .context("Chat failed")?;

    println!("{}", reply.reply);
    if let (Some(context), Some(citation)) = (&reply.context, reply.citation) {
        println!();
        println!("  Source [{}..{}]: {}", citation.start, citation.end, context);
    }
    Ok(())
}
