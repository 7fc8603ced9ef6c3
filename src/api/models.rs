use crate::api::{ModelInfo, ModelsResponse, OllamaTagsResponse};
use crate::core::providers::ProviderError;
use crate::core::providers::http::{request_error, summarize_error_body};
use crate::utils::url::construct_api_url;

async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(request_error)?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message: summarize_error_body(&error_text),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|err| ProviderError::Decode(err.to_string()))
}

/// Installed models from Ollama's `/api/tags`.
pub async fn fetch_ollama_models(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<Vec<String>, ProviderError> {
    let tags_url = construct_api_url(base_url, "api/tags");
    let tags: OllamaTagsResponse = get_json(client.get(tags_url)).await?;
    let mut names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
    names.sort();
    Ok(names)
}

/// Loaded models from an OpenAI-compatible `/v1/models`.
pub async fn fetch_openai_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<Vec<String>, ProviderError> {
    let models_url = construct_api_url(base_url, "v1/models");
    let mut request = client.get(models_url);
    if !api_key.is_empty() {
        request = request.header("Authorization", format!("Bearer {api_key}"));
    }
    let mut response: ModelsResponse = get_json(request).await?;
    sort_models(&mut response.data);
    Ok(response.data.into_iter().map(|m| m.id).collect())
}

pub fn sort_models(models: &mut [ModelInfo]) {
    // Group by owner, then alphabetically; unowned entries last
    models.sort_by(|a, b| match (&a.owned_by, &b.owned_by) {
        (Some(a_owner), Some(b_owner)) => a_owner.cmp(b_owner).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}
