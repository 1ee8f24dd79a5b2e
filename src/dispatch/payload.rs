use serde::{Deserialize, Serialize};

/// Body posted to the generation webhook for one image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationPayload {
    pub email: String,
    pub id: String,
    pub prompt: String,
    pub data: Vec<InferenceTask>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceTask {
    pub task_type: String,
    #[serde(rename = "taskUUID")]
    pub task_uuid: String,
    pub number_results: u32,
    pub output_format: String,
    pub width: u32,
    pub height: u32,
    pub output_type: Vec<String>,
    pub reference_images: Vec<String>,
    pub model: String,
    pub positive_prompt: String,
}

impl GenerationPayload {
    pub fn new(
        email: &str,
        correlation_id: String,
        prompt: &str,
        width: u32,
        height: u32,
        reference_images: Vec<String>,
        model: &str,
    ) -> Self {
        Self {
            email: email.to_string(),
            id: correlation_id.clone(),
            prompt: prompt.to_string(),
            data: vec![InferenceTask {
                task_type: "imageInference".to_string(),
                task_uuid: correlation_id,
                number_results: 1,
                output_format: "JPEG".to_string(),
                width,
                height,
                output_type: vec!["URL".to_string()],
                reference_images,
                model: model.to_string(),
                positive_prompt: prompt.to_string(),
            }],
        }
    }
}
