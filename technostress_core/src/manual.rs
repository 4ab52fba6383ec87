/*!

This is the long-form manual for `technostress_core` and the `technostress` command line.

## The questionnaire

Each participant fills in three sections:

* participant information: gender, age bracket, department (free text), and the education
  level of each parent
* notification and technology usage: daily screen time, daily notification count, the kind
  of notifications received most, and the device receiving most of them
* 12 statements `S1` to `S12` (see [`QUESTIONS`](crate::QUESTIONS)), each rated from 1
  (strongly disagree) to 5 (strongly agree)

The average of the 12 scores gives the technostress level:

| average            | level  |
|--------------------|--------|
| below 2.5          | Low    |
| from 2.5 below 3.5 | Medium |
| 3.5 and above      | High   |

## Participation limit

Every submission carries an identity token: an email address, a student number or any alias
the participant will remember. The token is trimmed and lowercased, then hashed with SHA-256.
Only the digest is stored. The same token may be used for at most 2 accepted submissions; a
third one is rejected and nothing is written.

## Store format

Responses are appended to a CSV file with the following header:

```text
timestamp,identity_hash,gender,age,department,mother_education,father_education,screen_time,notification_count,notification_type,device,average,level,S1,S2,S3,S4,S5,S6,S7,S8,S9,S10,S11,S12
```

Rows are never modified or deleted. A file with a different header is refused rather than
mixed with new rows.

## Configuration

`technostress` reads an optional JSON configuration file (`--config`):

```text
{
  "storePath": "responses.csv",
  "adminPassword": "change-me",
  "lockTimeoutMs": 5000,
  "emailVerification": {
    "required": true,
    "sender": "survey@example.org",
    "relayUrl": "https://mail-relay.example.org/send"
  }
}
```

All the fields are optional. Secrets may be provided through the environment instead:

- `TECHNOSTRESS_ADMIN_PASSWORD` overrides `adminPassword`
- `TECHNOSTRESS_MAIL_TOKEN` is the bearer token sent to the mail relay

While a submission is being recorded, `technostress` holds a lock file next to the store
(`<storePath>.lock`). Other submissions wait up to `lockTimeoutMs` for it. A lock file older than
10 times `lockTimeoutMs` is left over from an interrupted run: it is removed automatically and a
warning is logged. It can also be deleted by hand once no `technostress` process is running.

Instead of `relayUrl`, `outboxPath` writes the verification emails to a local file, which is
convenient when testing a deployment.

## Email verification

When `emailVerification.required` is set, a 6-digit code is sent to the address given with
`--email` before the submission is recorded. The code is valid for 5 minutes. Typing `resend`
at the prompt sends the same code again with a new validity window.

 */
