//! 示例内容：所有真实通道都失败或开启模拟模式时使用。内容一眼可辨为假，结构与真实结果一致。

use crate::models::{OperationData, OperationPayload};

const DEFAULT_TITLE: &str = "示例文章标题";

/** \brief 生成图片的示例编号从 4 开始，与提取图片区分。 */
const GENERATED_IMAGE_SEED: usize = 4;
const EXTRACTED_IMAGE_SEED: usize = 1;

pub fn respond(payload: &OperationPayload) -> OperationData {
    match payload {
        OperationPayload::Test => OperationData::Message("API连接测试成功（示例响应）".to_string()),
        OperationPayload::Article(params) => {
            OperationData::Content(article(params.title().unwrap_or(DEFAULT_TITLE)))
        }
        OperationPayload::Images(params) => {
            OperationData::Images(stock_images(GENERATED_IMAGE_SEED, params.count))
        }
        OperationPayload::Extract(params) => {
            OperationData::Images(stock_images(EXTRACTED_IMAGE_SEED, params.count))
        }
        OperationPayload::Scrape(_) => OperationData::Content(scrape()),
    }
}

pub fn stock_images(seed: usize, count: usize) -> Vec<String> {
    (seed..seed.saturating_add(count))
        .map(|n| format!("https://picsum.photos/800/600?random={n}"))
        .collect()
}

fn article(title: &str) -> String {
    format!(
        "# {title}

## 引言

API调用失败，无法生成真实内容。以下是示例内容，仅用于演示界面。请检查API配置和网络连接。

## API调用失败可能的原因

1. API密钥无效或过期
2. 网络连接问题
3. API服务暂时不可用
4. API调用参数错误

## 建议解决方案

1. 验证您的API密钥是否正确
2. 检查网络连接
3. 稍后再试
4. 检查API日志以获取详细错误信息

> 这是示例内容，不代表实际API生成结果。
"
    )
}

fn scrape() -> String {
    "这是示例抓取内容。API调用失败，无法获取真实内容。

在真实使用中，此处会显示从您提供的URL中提取的内容。请检查网络连接和API配置。"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleParams, ExtractParams, ImageParams, ScrapeParams};

    #[test]
    fn test_article_uses_title_or_placeholder() {
        let data = respond(&OperationPayload::Article(ArticleParams {
            title: Some("边缘计算".into()),
            ..Default::default()
        }));
        let OperationData::Content(text) = data else {
            panic!("expected content");
        };
        assert!(text.starts_with("# 边缘计算\n"));
        assert!(text.contains("示例内容"));

        let data = respond(&OperationPayload::Article(ArticleParams::default()));
        assert!(matches!(data, OperationData::Content(t) if t.starts_with("# 示例文章标题")));
    }

    #[test]
    fn test_image_counts_are_exact() {
        let data = respond(&OperationPayload::Images(ImageParams {
            count: 5,
            ..Default::default()
        }));
        assert_eq!(
            data,
            OperationData::Images(stock_images(GENERATED_IMAGE_SEED, 5))
        );
        let OperationData::Images(urls) = respond(&OperationPayload::Extract(ExtractParams {
            links: vec![],
            count: 2,
        })) else {
            panic!("expected images");
        };
        assert_eq!(urls[0], "https://picsum.photos/800/600?random=1");
        assert_eq!(urls.len(), 2);
        assert_eq!(
            respond(&OperationPayload::Images(ImageParams::default())),
            OperationData::Images(vec![])
        );
    }

    #[test]
    fn test_stock_images_near_usize_max() {
        assert_eq!(stock_images(usize::MAX - 1, 5).len(), 1);
        assert!(stock_images(usize::MAX, 3).is_empty());
    }

    #[test]
    fn test_scrape_and_test_are_marked() {
        assert!(matches!(
            respond(&OperationPayload::Scrape(ScrapeParams { url: "https://x".into() })),
            OperationData::Content(t) if t.contains("示例")
        ));
        assert!(matches!(
            respond(&OperationPayload::Test),
            OperationData::Message(m) if m.contains("示例")
        ));
    }
}
